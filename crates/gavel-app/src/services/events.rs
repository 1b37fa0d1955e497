// Calendar events.

use std::sync::Arc;

use chrono::Utc;
use gavel_core::db::Database;
use gavel_core::model::{Event, EventType, EventUpdate, NewEvent};

use super::LastError;
use crate::error::{ServiceError, ServiceResult};

const SERVICE: &str = "events";

pub struct EventsService {
    db: Arc<Database>,
    events: Vec<Event>,
    last_error: LastError,
}

impl EventsService {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            events: Vec::new(),
            last_error: LastError::default(),
        }
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.get()
    }

    pub fn clear_error(&mut self) {
        self.last_error.clear();
    }

    pub fn get_events(&mut self) -> ServiceResult<Vec<Event>> {
        let result = self.db.list_events().map_err(ServiceError::from);
        let events = self.last_error.record(SERVICE, result)?;
        self.events = events.clone();
        Ok(events)
    }

    pub fn get_event_by_id(&mut self, id: i64) -> ServiceResult<Event> {
        let result = self.db.get_event(id).map_err(ServiceError::from);
        self.last_error.record(SERVICE, result)
    }

    pub fn create_event(&mut self, event: &NewEvent) -> ServiceResult<Event> {
        let result = self.db.insert_event(event).map_err(ServiceError::from);
        let created = self.last_error.record(SERVICE, result)?;
        self.events.push(created.clone());
        Ok(created)
    }

    pub fn update_event(&mut self, id: i64, update: &EventUpdate) -> ServiceResult<Event> {
        let result = self.db.update_event(id, update).map_err(ServiceError::from);
        let updated = self.last_error.record(SERVICE, result)?;
        if let Some(cached) = self.events.iter_mut().find(|e| e.id == id) {
            *cached = updated.clone();
        }
        Ok(updated)
    }

    pub fn delete_event(&mut self, id: i64) -> ServiceResult<()> {
        let result = self.db.delete_event(id).map_err(ServiceError::from);
        self.last_error.record(SERVICE, result)?;
        self.events.retain(|e| e.id != id);
        Ok(())
    }

    pub fn get_events_by_type(&mut self, event_type: EventType) -> ServiceResult<Vec<Event>> {
        let result = self
            .db
            .list_events_by_type(event_type)
            .map_err(ServiceError::from);
        self.last_error.record(SERVICE, result)
    }

    pub fn get_active_events(&mut self) -> ServiceResult<Vec<Event>> {
        let result = self.db.list_active_events().map_err(ServiceError::from);
        self.last_error.record(SERVICE, result)
    }

    /// The next `limit` scheduled events from now on.
    pub fn get_upcoming_events(&mut self, limit: usize) -> ServiceResult<Vec<Event>> {
        let result = self
            .db
            .list_upcoming_events(Utc::now(), limit)
            .map_err(ServiceError::from);
        self.last_error.record(SERVICE, result)
    }
}
