use colored::Colorize;
use sim_controller::Navigator;
use sim_core::{HistoryMode, NavigationIntent};

/// Shows address changes in the terminal in place of a browser location bar.
pub struct ConsoleNavigator;

impl Navigator for ConsoleNavigator {
    fn navigate(&self, intent: &NavigationIntent) {
        match intent.mode {
            HistoryMode::Replace => {
                println!("{}", format!("🔗 Bookmark: {}", intent.target).dimmed())
            }
            HistoryMode::Push => {
                println!("{}", format!("↪ Leaving simulation for {}", intent.target).yellow())
            }
        }
    }
}
