use sim_core::{HistoryMode, NavigationIntent};

/// The address-bar capability of the hosting view layer.
pub trait Navigator: Send + Sync {
    fn navigate(&self, intent: &NavigationIntent);
}

/// Navigator for headless use: records intents in the log only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNavigator;

impl Navigator for LogNavigator {
    fn navigate(&self, intent: &NavigationIntent) {
        match intent.mode {
            HistoryMode::Replace => log::info!("Address replaced with {}", intent.target),
            HistoryMode::Push => log::info!("Navigating to {}", intent.target),
        }
    }
}
