use std::collections::{HashMap, HashSet};
use std::io::{self, Write};

use colored::Colorize;
use sim_controller::ControllerSnapshot;
use sim_core::{EvaluationResult, Message, MessageId, Role, SimulationError};

/// Turns successive controller snapshots into incremental terminal output.
/// Streamed text is printed as it grows, each piece exactly once.
#[derive(Default)]
pub struct Renderer {
    printed: HashMap<MessageId, usize>,
    closed: HashSet<MessageId>,
    last_progress: u8,
    shown_error: Option<SimulationError>,
    shown_evaluation: bool,
}

impl Renderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn render(&mut self, snapshot: &ControllerSnapshot, out: &mut impl Write) -> io::Result<()> {
        if snapshot.phase.is_starting() {
            let progress = &snapshot.startup_progress;
            if progress.progress > self.last_progress {
                writeln!(
                    out,
                    "{}",
                    format!("⏳ [{:>3}%] {}", progress.progress, progress.message).cyan()
                )?;
                self.last_progress = progress.progress;
            }
        } else if snapshot.startup_progress.is_idle() {
            self.last_progress = 0;
        }

        for message in &snapshot.messages {
            self.render_message(message, out)?;
        }

        if snapshot.error != self.shown_error {
            if let Some(error) = &snapshot.error {
                writeln!(out, "{}", format!("❌ {}", error).red())?;
                if error.retryable {
                    writeln!(out, "{}", "   Type /retry to try again.".dimmed())?;
                }
            }
            self.shown_error = snapshot.error.clone();
        }

        match &snapshot.evaluation {
            Some(evaluation) if !self.shown_evaluation => {
                write_evaluation(evaluation, out)?;
                self.shown_evaluation = true;
            }
            None => self.shown_evaluation = false,
            _ => {}
        }

        out.flush()
    }

    fn render_message(&mut self, message: &Message, out: &mut impl Write) -> io::Result<()> {
        if !self.printed.contains_key(&message.id) {
            if message.is_streaming && message.content.is_empty() {
                return Ok(());
            }
            write!(out, "{} ", speaker_tag(message))?;
            self.printed.insert(message.id, 0);
        }

        let shown = self.printed.get(&message.id).copied().unwrap_or(0);
        if let Some(delta) = message.content.get(shown..).filter(|d| !d.is_empty()) {
            let delta = match message.role {
                Role::Patient => delta.green(),
                Role::Clinician => delta.normal(),
                Role::System => delta.dimmed(),
            };
            write!(out, "{}", delta)?;
            self.printed.insert(message.id, message.content.len());
        }

        if !message.is_streaming && self.closed.insert(message.id) {
            writeln!(out)?;
        }
        Ok(())
    }
}

fn speaker_tag(message: &Message) -> colored::ColoredString {
    let tag = format!("{}:", message.speaks_for);
    match message.role {
        Role::Patient => tag.green().bold(),
        Role::Clinician => tag.blue().bold(),
        Role::System => tag.dimmed(),
    }
}

pub fn write_evaluation(evaluation: &EvaluationResult, out: &mut impl Write) -> io::Result<()> {
    writeln!(out)?;
    writeln!(out, "{}", "📋 Evaluation".cyan().bold())?;
    writeln!(out, "{}", "─".repeat(50).dimmed())?;
    if evaluation.degraded {
        writeln!(out, "{}", evaluation.evaluation_text.yellow())?;
    } else {
        writeln!(out, "{}", evaluation.evaluation_text)?;
    }

    for metric in evaluation.metrics.iter().flatten() {
        let score = match metric.max_score {
            Some(max) => format!("{}/{}", metric.score, max),
            None => metric.score.to_string(),
        };
        write!(out, "  • {}: {}", metric.name.bold(), score)?;
        match &metric.comment {
            Some(comment) => writeln!(out, " - {}", comment.dimmed())?,
            None => writeln!(out)?,
        }
    }
    writeln!(out, "{}", "─".repeat(50).dimmed())
}
