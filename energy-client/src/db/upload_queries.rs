use sqlx::{PgConnection, PgPool};

use crate::domain::{OwnerId, UploadBatch};

/// Register a new, unprocessed upload. The owner row is created on first use.
pub async fn create_batch(pool: &PgPool, owner: &OwnerId, payload: &str) -> sqlx::Result<UploadBatch> {
    let mut tx = pool.begin().await?;

    sqlx::query("INSERT INTO owners (id) VALUES ($1) ON CONFLICT (id) DO NOTHING")
        .bind(owner)
        .execute(&mut *tx)
        .await?;

    let batch = sqlx::query_as::<_, UploadBatch>(
        r#"
        INSERT INTO upload_batches (owner_id, payload, submitted_at, processed)
        VALUES ($1, $2, now(), FALSE)
        RETURNING id, owner_id, payload, submitted_at, processed
        "#,
    )
    .bind(owner)
    .bind(payload)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(batch)
}

/// Flip `processed` on an unprocessed batch. Returns `false` when no such batch exists.
pub async fn mark_processed(conn: &mut PgConnection, batch_id: i64) -> sqlx::Result<bool> {
    let res = sqlx::query("UPDATE upload_batches SET processed = TRUE WHERE id = $1 AND processed = FALSE")
        .bind(batch_id)
        .execute(conn)
        .await?;

    Ok(res.rows_affected() == 1)
}

/// The owner's uploads, newest first.
pub async fn batches_for_owner(pool: &PgPool, owner: &OwnerId) -> sqlx::Result<Vec<UploadBatch>> {
    sqlx::query_as::<_, UploadBatch>(
        r#"
        SELECT id, owner_id, payload, submitted_at, processed
        FROM upload_batches
        WHERE owner_id = $1
        ORDER BY submitted_at DESC, id DESC
        "#,
    )
    .bind(owner)
    .fetch_all(pool)
    .await
}
