//! Application state shared across handlers

use crate::account::AccountService;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub accounts: AccountService,
}
