use crate::db::error::RepositoryError;
use crate::db::schema::sessions;
use chrono::{DateTime, Utc};
use diesel::prelude::*;

pub struct SessionRepository;

impl SessionRepository {
    pub fn delete_expired(conn: &mut PgConnection, now: DateTime<Utc>) -> Result<usize, RepositoryError> {
        diesel::delete(sessions::table.filter(sessions::expires_at.le(now)))
            .execute(conn)
            .map_err(Into::into)
    }
}
