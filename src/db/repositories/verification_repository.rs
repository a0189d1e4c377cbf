use crate::db::error::RepositoryError;
use crate::db::schema::verifications;
use chrono::{DateTime, Utc};
use diesel::prelude::*;

pub struct VerificationRepository;

impl VerificationRepository {
    /// Supprime les vérifications expirées (les codes ne sont jamais réutilisés)
    pub fn delete_expired(conn: &mut PgConnection, now: DateTime<Utc>) -> Result<usize, RepositoryError> {
        diesel::delete(verifications::table.filter(verifications::expires_at.le(now)))
            .execute(conn)
            .map_err(Into::into)
    }
}
