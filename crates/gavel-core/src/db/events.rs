// Auction calendar events.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::rows::{self, EVENT_COLUMNS};
use super::{Database, DbError, DbResult};
use crate::changes::{ChangeKind, Table};
use crate::model::{Event, EventStatus, EventType, EventUpdate, NewEvent};

impl Database {
    /// Every event, earliest start first.
    pub fn list_events(&self) -> DbResult<Vec<Event>> {
        self.query_events("ORDER BY start_date, id", params![])
    }

    pub fn get_event(&self, id: i64) -> DbResult<Event> {
        fetch_event(&self.conn(), id)
    }

    pub fn list_events_by_type(&self, event_type: EventType) -> DbResult<Vec<Event>> {
        self.query_events("WHERE event_type = ?1 ORDER BY start_date, id", [event_type])
    }

    pub fn list_active_events(&self) -> DbResult<Vec<Event>> {
        self.query_events(
            "WHERE status = ?1 ORDER BY start_date, id",
            [EventStatus::Active],
        )
    }

    /// Scheduled events starting at or after `now`, soonest first.
    pub fn list_upcoming_events(&self, now: DateTime<Utc>, limit: usize) -> DbResult<Vec<Event>> {
        self.query_events(
            "WHERE status = ?1 AND start_date >= ?2 ORDER BY start_date, id LIMIT ?3",
            params![EventStatus::Scheduled, now, limit as i64],
        )
    }

    fn query_events<P: rusqlite::Params>(&self, tail: &str, params: P) -> DbResult<Vec<Event>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!("SELECT {EVENT_COLUMNS} FROM events {tail}"))?;
        let events = stmt
            .query_map(params, rows::event)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(events)
    }

    pub fn insert_event(&self, event: &NewEvent) -> DbResult<Event> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO events (name, description, event_type, start_date, end_date,
                                 created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![
                event.name,
                event.description,
                event.event_type,
                event.start_date,
                event.end_date,
                Utc::now(),
            ],
        )?;
        let created = fetch_event(&conn, conn.last_insert_rowid())?;
        drop(conn);

        self.publish(&[(Table::Events, ChangeKind::Insert)]);
        Ok(created)
    }

    pub fn update_event(&self, id: i64, update: &EventUpdate) -> DbResult<Event> {
        let conn = self.conn();
        let changed = conn.execute(
            "UPDATE events SET
                name        = COALESCE(?2, name),
                description = COALESCE(?3, description),
                event_type  = COALESCE(?4, event_type),
                start_date  = COALESCE(?5, start_date),
                end_date    = COALESCE(?6, end_date),
                status      = COALESCE(?7, status),
                updated_at  = ?8
             WHERE id = ?1",
            params![
                id,
                update.name,
                update.description,
                update.event_type,
                update.start_date,
                update.end_date,
                update.status,
                Utc::now(),
            ],
        )?;
        if changed == 0 {
            return Err(DbError::not_found(Table::Events, id));
        }
        let updated = fetch_event(&conn, id)?;
        drop(conn);

        self.publish(&[(Table::Events, ChangeKind::Update)]);
        Ok(updated)
    }

    pub fn delete_event(&self, id: i64) -> DbResult<()> {
        let deleted = self.conn().execute("DELETE FROM events WHERE id = ?1", [id])?;
        if deleted == 0 {
            return Err(DbError::not_found(Table::Events, id));
        }
        self.publish(&[(Table::Events, ChangeKind::Delete)]);
        Ok(())
    }
}

fn fetch_event(conn: &Connection, id: i64) -> DbResult<Event> {
    conn.query_row(
        &format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = ?1"),
        [id],
        rows::event,
    )
    .optional()?
    .ok_or_else(|| DbError::not_found(Table::Events, id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::test_db;
    use chrono::Duration;

    fn event(name: &str, event_type: EventType, start: DateTime<Utc>) -> NewEvent {
        NewEvent {
            name: name.into(),
            description: None,
            event_type,
            start_date: start,
            end_date: start + Duration::hours(4),
        }
    }

    #[test]
    fn insert_defaults_to_scheduled() {
        let db = test_db();
        let created = db
            .insert_event(&event("Mega auction", EventType::Auction, Utc::now()))
            .unwrap();
        assert_eq!(created.status, EventStatus::Scheduled);
        assert_eq!(db.get_event(created.id).unwrap(), created);
    }

    #[test]
    fn queries_by_type_status_and_start() {
        let db = test_db();
        let now = Utc::now();
        db.insert_event(&event("Past draft", EventType::Draft, now - Duration::days(3)))
            .unwrap();
        let later = db
            .insert_event(&event("Trade window", EventType::Trade, now + Duration::days(9)))
            .unwrap();
        let soon = db
            .insert_event(&event("Auction day", EventType::Auction, now + Duration::days(2)))
            .unwrap();
        let live = db
            .insert_event(&event("Live", EventType::Auction, now + Duration::days(1)))
            .unwrap();
        db.update_event(
            live.id,
            &EventUpdate {
                status: Some(EventStatus::Active),
                ..EventUpdate::default()
            },
        )
        .unwrap();

        let auctions = db.list_events_by_type(EventType::Auction).unwrap();
        assert_eq!(auctions.len(), 2);

        let active: Vec<i64> = db.list_active_events().unwrap().iter().map(|e| e.id).collect();
        assert_eq!(active, vec![live.id]);

        let upcoming: Vec<i64> = db
            .list_upcoming_events(now, 5)
            .unwrap()
            .iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(upcoming, vec![soon.id, later.id]);

        assert_eq!(db.list_upcoming_events(now, 1).unwrap().len(), 1);
        assert_eq!(db.list_events().unwrap().len(), 4);
    }

    #[test]
    fn delete_event_then_not_found() {
        let db = test_db();
        let created = db
            .insert_event(&event("Mega auction", EventType::Auction, Utc::now()))
            .unwrap();
        db.delete_event(created.id).unwrap();
        assert!(matches!(db.get_event(created.id), Err(DbError::NotFound { .. })));
    }
}
