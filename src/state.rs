//! # Application State
//!
//! The process-wide service context, built exactly once at startup and
//! handed to every session. Singleton collaborators (store handle,
//! provider clients, the audio system) live here as explicit fields
//! instead of module-level globals, so tests assemble their own context
//! from fakes.
//!
//! The registry maps live meeting ids to their in-process managers. A
//! reconnecting client is re-attached to the live manager when one
//! exists; otherwise the persisted document is the source of truth.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::config::AppConfig;
use crate::meeting::{MeetingDeps, MeetingManager};

/// Shared application state, cloned into each session handler.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub deps: MeetingDeps,
    pub registry: MeetingRegistry,
}

impl AppState {
    pub fn new(config: AppConfig, deps: MeetingDeps) -> Self {
        Self {
            config,
            deps,
            registry: MeetingRegistry::default(),
        }
    }
}

/// Live managers by meeting id. One meeting lives in exactly one process,
/// so this map is the whole ownership story.
#[derive(Clone, Default)]
pub struct MeetingRegistry {
    meetings: Arc<RwLock<HashMap<i64, Arc<MeetingManager>>>>,
}

impl MeetingRegistry {
    pub fn insert(&self, manager: Arc<MeetingManager>) {
        self.meetings
            .write()
            .unwrap()
            .insert(manager.meeting_id(), manager);
    }

    pub fn get(&self, meeting_id: i64) -> Option<Arc<MeetingManager>> {
        self.meetings.read().unwrap().get(&meeting_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.meetings.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
