//! User profile repository.

use sqlx::PgPool;

use kestrel_core::{ProfileId, UserId};

use super::RepositoryError;
use crate::models::{ProfileDefaults, UserProfile};

#[derive(sqlx::FromRow)]
struct ProfileRow {
    id: ProfileId,
    user_id: UserId,
    username: String,
    default_phone_number: Option<String>,
    default_country: Option<String>,
    default_postcode: Option<String>,
    default_town_or_city: Option<String>,
    default_street_address1: Option<String>,
    default_street_address2: Option<String>,
    default_county: Option<String>,
}

impl From<ProfileRow> for UserProfile {
    fn from(row: ProfileRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            username: row.username,
            defaults: ProfileDefaults {
                phone_number: row.default_phone_number,
                country: row.default_country,
                postcode: row.default_postcode,
                town_or_city: row.default_town_or_city,
                street_address1: row.default_street_address1,
                street_address2: row.default_street_address2,
                county: row.default_county,
            },
        }
    }
}

const PROFILE_COLUMNS: &str = "id, user_id, username, default_phone_number, default_country, \
                               default_postcode, default_town_or_city, default_street_address1, \
                               default_street_address2, default_county";

/// Repository for customer profiles.
pub struct ProfileRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ProfileRepository<'a> {
    /// Create a new profile repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get a profile by login name.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_username(
        &self,
        username: &str,
    ) -> Result<Option<UserProfile>, RepositoryError> {
        let row = sqlx::query_as::<_, ProfileRow>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM storefront.user_profiles WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(UserProfile::from))
    }

    /// Get the profile for a user, creating an empty one if needed.
    ///
    /// The stored username follows the session's username, so renamed
    /// accounts keep their profile.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_or_create(
        &self,
        user_id: UserId,
        username: &str,
    ) -> Result<UserProfile, RepositoryError> {
        let row = sqlx::query_as::<_, ProfileRow>(&format!(
            r"
            INSERT INTO storefront.user_profiles (user_id, username)
            VALUES ($1, $2)
            ON CONFLICT (user_id) DO UPDATE SET username = EXCLUDED.username
            RETURNING {PROFILE_COLUMNS}
            "
        ))
        .bind(user_id)
        .bind(username)
        .fetch_one(self.pool)
        .await?;

        Ok(row.into())
    }

    /// Replace the saved delivery defaults.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the profile does not exist.
    pub async fn update_defaults(
        &self,
        id: ProfileId,
        defaults: &ProfileDefaults,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE storefront.user_profiles SET
                default_phone_number = $2,
                default_country = $3,
                default_postcode = $4,
                default_town_or_city = $5,
                default_street_address1 = $6,
                default_street_address2 = $7,
                default_county = $8
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(&defaults.phone_number)
        .bind(&defaults.country)
        .bind(&defaults.postcode)
        .bind(&defaults.town_or_city)
        .bind(&defaults.street_address1)
        .bind(&defaults.street_address2)
        .bind(&defaults.county)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}
