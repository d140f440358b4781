use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use uuid::Uuid;

use crate::ids::UserId;

/// Bearer tokens issued at login, held in process memory.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    tokens: Mutex<HashMap<String, UserId>>,
}

impl SessionRegistry {
    pub fn issue(&self, user: UserId) -> String {
        let token = Uuid::new_v4().simple().to_string();
        self.tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(token.clone(), user);
        token
    }

    pub fn resolve(&self, token: &str) -> Option<UserId> {
        self.tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(token)
            .copied()
    }

    pub fn revoke(&self, token: &str) -> bool {
        self.tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(token)
            .is_some()
    }
}
