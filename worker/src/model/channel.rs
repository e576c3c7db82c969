use entity::channel;
use entity::prelude::*;
use num_derive::{FromPrimitive, ToPrimitive};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ActiveValue, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    TransactionTrait,
};
use serde_json::json;

use crate::error::AppResult;
use crate::prompt::groq::ClassificationAnswer;

/// Channel lifecycle: 0 = pending classification, 1 = submitted / awaiting
/// batch result, 2 = classified. Intake advances 0→1, the reconciler 1→2.
#[derive(FromPrimitive, ToPrimitive, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    Pending = 0,
    Submitted = 1,
    Classified = 2,
}

/// A channel that made it into a submitted request file, with the videos
/// fetched for it during intake.
#[derive(Debug, Clone)]
pub struct IncludedChannel {
    pub channel_name: String,
    pub channel_handle: String,
    pub channel_id: String,
    pub videos: Vec<serde_json::Value>,
}

pub struct ChannelCtrl;

impl ChannelCtrl {
    pub async fn all_pending(conn: &DatabaseConnection) -> AppResult<Vec<channel::Model>> {
        let channels = Channel::find()
            .filter(channel::Column::Status.eq(ChannelStatus::Pending as i32))
            .all(conn)
            .await?;

        Ok(channels)
    }

    /// Advance included channels to submitted and append their fetched
    /// videos. Only channels that actually made it into the request file are
    /// touched; skipped ones stay pending.
    pub async fn mark_submitted(
        conn: &DatabaseConnection,
        included: &[IncludedChannel],
    ) -> AppResult<u64> {
        let txn = conn.begin().await?;
        let mut updated = 0;

        for inc in included {
            let row = Channel::find()
                .filter(channel::Column::ChannelName.eq(&inc.channel_name))
                .filter(channel::Column::ChannelHandle.eq(&inc.channel_handle))
                .one(&txn)
                .await?;

            let Some(row) = row else {
                tracing::warn!("Channel {} disappeared before update", inc.channel_name);
                continue;
            };

            let merged = append_videos(&row.videos, &inc.videos);
            let mut active: channel::ActiveModel = row.into();
            active.status = ActiveValue::Set(ChannelStatus::Submitted as i32);
            active.channel_id = ActiveValue::Set(Some(inc.channel_id.clone()));
            active.videos = ActiveValue::Set(merged);
            active.update(&txn).await?;
            updated += 1;
        }

        txn.commit().await?;
        Ok(updated)
    }

    /// Persist validated category assignments, keyed by channel name. All
    /// updates for one batch land in a single transaction; re-applying
    /// identical answers is idempotent.
    pub async fn apply_categories(
        conn: &DatabaseConnection,
        answers: &[ClassificationAnswer],
    ) -> AppResult<u64> {
        let txn = conn.begin().await?;
        let mut matched = 0;

        for answer in answers {
            let result = Channel::update_many()
                .filter(channel::Column::ChannelName.eq(&answer.channel_name))
                .col_expr(
                    channel::Column::ChannelCategories,
                    Expr::value(json!(answer.categories)),
                )
                .col_expr(
                    channel::Column::Status,
                    Expr::value(ChannelStatus::Classified as i32),
                )
                .exec(&txn)
                .await?;

            matched += result.rows_affected;
        }

        txn.commit().await?;
        Ok(matched)
    }
}

/// Append new videos onto the stored JSON array. A non-array stored value
/// (fresh record defaults) is replaced by the new list.
pub fn append_videos(existing: &serde_json::Value, new: &[serde_json::Value]) -> serde_json::Value {
    let mut merged = match existing {
        serde_json::Value::Array(items) => items.clone(),
        _ => Vec::new(),
    };
    merged.extend(new.iter().cloned());
    serde_json::Value::Array(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_traits::{FromPrimitive, ToPrimitive};

    #[test]
    fn status_round_trips_through_ints() {
        assert_eq!(ChannelStatus::from_i32(0), Some(ChannelStatus::Pending));
        assert_eq!(ChannelStatus::from_i32(1), Some(ChannelStatus::Submitted));
        assert_eq!(ChannelStatus::from_i32(2), Some(ChannelStatus::Classified));
        assert_eq!(ChannelStatus::from_i32(3), None);
        assert_eq!(ChannelStatus::Classified.to_i32(), Some(2));
    }

    #[test]
    fn append_videos_extends_existing_array() {
        let existing = json!([{"video_id": "a"}]);
        let new = vec![json!({"video_id": "b"}), json!({"video_id": "c"})];
        let merged = append_videos(&existing, &new);
        assert_eq!(merged.as_array().unwrap().len(), 3);
    }

    #[test]
    fn append_videos_replaces_non_array() {
        let merged = append_videos(&serde_json::Value::Null, &[json!({"video_id": "a"})]);
        assert_eq!(merged, json!([{"video_id": "a"}]));
    }

    #[cfg(feature = "integration")]
    #[tokio::test]
    async fn apply_categories_twice_leaves_same_result() {
        let (conn, _) = crate::testing::common::setup().await;
        let name = format!("channel_{}", uuid::Uuid::new_v4());

        channel::ActiveModel {
            channel_name: ActiveValue::Set(name.clone()),
            channel_handle: ActiveValue::Set(format!("@{name}")),
            channel_id: ActiveValue::Set(Some("UC_test".to_string())),
            status: ActiveValue::Set(ChannelStatus::Submitted as i32),
            videos: ActiveValue::Set(json!([])),
            channel_categories: ActiveValue::Set(json!([])),
            timestamp: ActiveValue::Set(chrono::Utc::now().fixed_offset()),
            ..Default::default()
        }
        .insert(&conn)
        .await
        .expect("insert channel");

        let answers = vec![ClassificationAnswer {
            channel_name: name.clone(),
            categories: vec![1, 4],
        }];

        let first = ChannelCtrl::apply_categories(&conn, &answers)
            .await
            .expect("first apply");
        assert_eq!(first, 1);

        let second = ChannelCtrl::apply_categories(&conn, &answers)
            .await
            .expect("second apply");
        assert_eq!(second, 1);

        let row = Channel::find()
            .filter(channel::Column::ChannelName.eq(&name))
            .one(&conn)
            .await
            .expect("fetch channel")
            .expect("channel exists");
        assert_eq!(row.status, ChannelStatus::Classified as i32);
        assert_eq!(row.channel_categories, json!([1, 4]));

        Channel::delete_many()
            .filter(channel::Column::ChannelName.eq(&name))
            .exec(&conn)
            .await
            .expect("cleanup");
    }
}
