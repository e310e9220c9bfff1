use sqlx::PgPool;

use crate::models::{linked_account::LinkedAccount, platform::Platform};
use crate::types::UserId;

pub async fn find_linked_account(
    pool: &PgPool,
    user_id: UserId,
    platform: Platform,
) -> Result<Option<LinkedAccount>, sqlx::Error> {
    sqlx::query_as::<_, LinkedAccount>(
        "SELECT user_id, platform, platform_user_id, created_at \
         FROM linked_accounts WHERE user_id = $1 AND platform = $2",
    )
    .bind(user_id)
    .bind(platform.as_str())
    .fetch_optional(pool)
    .await
}
