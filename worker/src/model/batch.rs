use chrono::Utc;
use entity::batch;
use entity::prelude::*;
use num_derive::{FromPrimitive, ToPrimitive};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ActiveValue, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
};

use crate::error::AppResult;

/// Batch record lifecycle: 0 = submitted and awaiting results, 1 = resolved.
#[derive(FromPrimitive, ToPrimitive, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Pending = 0,
    Resolved = 1,
}

pub struct BatchCtrl;

impl BatchCtrl {
    /// Record a freshly submitted batch with the provider's identifiers.
    pub async fn insert(
        conn: &DatabaseConnection,
        file_id: &str,
        batch_id: &str,
    ) -> AppResult<batch::Model> {
        let model = batch::ActiveModel {
            file_id: ActiveValue::Set(file_id.to_string()),
            batch_id: ActiveValue::Set(batch_id.to_string()),
            status: ActiveValue::Set(BatchState::Pending as i32),
            timestamp: ActiveValue::Set(Utc::now().fixed_offset()),
            ..Default::default()
        }
        .insert(conn)
        .await?;

        Ok(model)
    }

    pub async fn all_pending(conn: &DatabaseConnection) -> AppResult<Vec<batch::Model>> {
        let batches = Batch::find()
            .filter(batch::Column::Status.eq(BatchState::Pending as i32))
            .all(conn)
            .await?;

        Ok(batches)
    }

    /// Flip a batch to resolved. The status filter makes this at-most-once:
    /// the returned row count is 0 when the batch was already resolved.
    pub async fn mark_resolved(conn: &DatabaseConnection, batch_id: &str) -> AppResult<u64> {
        let result = Batch::update_many()
            .filter(batch::Column::BatchId.eq(batch_id))
            .filter(batch::Column::Status.eq(BatchState::Pending as i32))
            .col_expr(
                batch::Column::Status,
                Expr::value(BatchState::Resolved as i32),
            )
            .exec(conn)
            .await?;

        Ok(result.rows_affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_traits::FromPrimitive;

    #[test]
    fn batch_state_from_ints() {
        assert_eq!(BatchState::from_i32(0), Some(BatchState::Pending));
        assert_eq!(BatchState::from_i32(1), Some(BatchState::Resolved));
        assert_eq!(BatchState::from_i32(2), None);
    }

    #[cfg(feature = "integration")]
    #[tokio::test]
    async fn mark_resolved_flips_at_most_once() {
        let (conn, _) = crate::testing::common::setup().await;
        let batch_id = format!("batch_{}", uuid::Uuid::new_v4());

        BatchCtrl::insert(&conn, "file_test", &batch_id)
            .await
            .expect("insert batch");

        let first = BatchCtrl::mark_resolved(&conn, &batch_id)
            .await
            .expect("first resolve");
        assert_eq!(first, 1);

        let second = BatchCtrl::mark_resolved(&conn, &batch_id)
            .await
            .expect("second resolve");
        assert_eq!(second, 0);

        Batch::delete_many()
            .filter(batch::Column::BatchId.eq(&batch_id))
            .exec(&conn)
            .await
            .expect("cleanup");
    }
}
