//! SQLite-backed `PersistenceStore`, built on SeaORM the way the teacher's
//! `SqliteOrmPersistenceService` builds its store: resolve a db file path,
//! open a connection pool, then create any missing tables from the entity
//! definitions (no external migration files).

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectOptions, ConnectionTrait, Database, DatabaseConnection,
    EntityTrait, QueryFilter, Schema, TransactionTrait,
};
use uuid::Uuid;

use crate::domain::ports::PersistenceStore;
use crate::error::{AppError, AppResult};
use crate::models::{
    ChannelAllocation, ChannelPointDefinition, ChannelTestInstance, RawTestOutcome, TestBatchInfo,
    TestPlcChannel,
};

use super::entities;

const DEFAULT_DB_FILE: &str = "fat_data.sqlite";

pub struct SqlitePersistenceStore {
    conn: DatabaseConnection,
    db_file_path: PathBuf,
}

impl SqlitePersistenceStore {
    /// Opens (creating if absent) the SQLite database at `db_path`, or the
    /// default `fat_data.sqlite` under the current directory when `None`.
    /// `":memory:"` opens a private in-memory database.
    pub async fn new(db_path: Option<&Path>) -> AppResult<Self> {
        let db_file_path = db_path
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_FILE));

        let is_memory = db_file_path.to_str() == Some(":memory:");
        let db_url = if is_memory {
            "sqlite::memory:".to_string()
        } else {
            let absolute_path = if db_file_path.is_absolute() {
                db_file_path.clone()
            } else {
                std::env::current_dir()
                    .map_err(AppError::from)?
                    .join(&db_file_path)
            };
            if let Some(parent) = absolute_path.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    tokio::fs::create_dir_all(parent).await.map_err(AppError::from)?;
                }
            }
            #[cfg(windows)]
            {
                format!(
                    "sqlite:///{}?mode=rwc",
                    absolute_path.to_string_lossy().replace('\\', "/")
                )
            }
            #[cfg(not(windows))]
            {
                format!("sqlite://{}?mode=rwc", absolute_path.to_string_lossy())
            }
        };

        let mut connect_opts = ConnectOptions::new(db_url);
        connect_opts
            .max_connections(20)
            .min_connections(2)
            .connect_timeout(Duration::from_secs(30))
            .sqlx_logging(false);

        let conn = Database::connect(connect_opts)
            .await
            .map_err(|e| AppError::persistence_unavailable(e.to_string()))?;

        Self::setup_schema(&conn).await?;

        Ok(Self {
            conn,
            db_file_path,
        })
    }

    pub fn db_file_path(&self) -> &Path {
        &self.db_file_path
    }

    async fn setup_schema(db: &DatabaseConnection) -> AppResult<()> {
        let backend = db.get_database_backend();
        let schema = Schema::new(backend);

        macro_rules! create_table {
            ($entity:expr, $label:literal) => {{
                let stmt = schema.create_table_from_entity($entity).if_not_exists().to_owned();
                db.execute(backend.build(&stmt)).await.map_err(|e| {
                    AppError::persistence_unavailable(format!("创建 {} 表失败: {e}", $label))
                })?;
            }};
        }

        create_table!(entities::Entity, "channel_point_definitions");
        create_table!(entities::test_plc_channel::Entity, "test_plc_channels");
        create_table!(entities::test_batch::Entity, "test_batches");
        create_table!(entities::channel_allocation::Entity, "channel_allocations");
        create_table!(entities::channel_test_instance::Entity, "channel_test_instances");
        create_table!(entities::raw_test_outcome::Entity, "raw_test_outcomes");

        Ok(())
    }
}

#[async_trait]
impl PersistenceStore for SqlitePersistenceStore {
    async fn save_definitions(&self, definitions: &[ChannelPointDefinition]) -> AppResult<()> {
        for def in definitions {
            let am: entities::ActiveModel = def.try_into()?;
            entities::Entity::insert(am)
                .on_conflict(
                    sea_orm::sea_query::OnConflict::column(entities::Column::Id)
                        .update_columns([
                            entities::Column::Tag,
                            entities::Column::VariableName,
                            entities::Column::Description,
                            entities::Column::StationName,
                            entities::Column::ModuleName,
                            entities::Column::ModuleType,
                            entities::Column::ChannelNumber,
                            entities::Column::DataType,
                            entities::Column::PowerSupplyType,
                            entities::Column::WireSystem,
                            entities::Column::PlcAbsoluteAddress,
                            entities::Column::PlcCommunicationAddress,
                            entities::Column::RangeLo,
                            entities::Column::RangeHi,
                            entities::Column::EngUnit,
                            entities::Column::AlarmSetpointsJson,
                            entities::Column::MaintenanceJson,
                            entities::Column::Remarks,
                            entities::Column::SequenceNumber,
                        ])
                        .to_owned(),
                )
                .exec(&self.conn)
                .await
                .map_err(|e| AppError::persistence_unavailable(e.to_string()))?;
        }
        Ok(())
    }

    async fn load_definitions(&self) -> AppResult<Vec<ChannelPointDefinition>> {
        entities::Entity::find()
            .all(&self.conn)
            .await
            .map_err(|e| AppError::persistence_unavailable(e.to_string()))?
            .into_iter()
            .map(TryInto::try_into)
            .collect()
    }

    async fn save_test_channels(&self, channels: &[TestPlcChannel]) -> AppResult<()> {
        for ch in channels {
            let am: entities::test_plc_channel::ActiveModel = ch.into();
            entities::test_plc_channel::Entity::insert(am)
                .on_conflict(
                    sea_orm::sea_query::OnConflict::column(entities::test_plc_channel::Column::Id)
                        .update_columns([
                            entities::test_plc_channel::Column::ChannelAddress,
                            entities::test_plc_channel::Column::ChannelType,
                            entities::test_plc_channel::Column::CommunicationAddress,
                            entities::test_plc_channel::Column::PowerSupplyType,
                            entities::test_plc_channel::Column::Enabled,
                        ])
                        .to_owned(),
                )
                .exec(&self.conn)
                .await
                .map_err(|e| AppError::persistence_unavailable(e.to_string()))?;
        }
        Ok(())
    }

    async fn load_test_channels(&self) -> AppResult<Vec<TestPlcChannel>> {
        entities::test_plc_channel::Entity::find()
            .all(&self.conn)
            .await
            .map_err(|e| AppError::persistence_unavailable(e.to_string()))?
            .into_iter()
            .map(TryInto::try_into)
            .collect()
    }

    async fn save_batch(&self, batch: &TestBatchInfo) -> AppResult<()> {
        let am: entities::test_batch::ActiveModel = batch.into();
        entities::test_batch::Entity::insert(am)
            .on_conflict(
                sea_orm::sea_query::OnConflict::column(entities::test_batch::Column::BatchId)
                    .update_columns([
                        entities::test_batch::Column::BatchName,
                        entities::test_batch::Column::ProductModel,
                        entities::test_batch::Column::SerialNumber,
                        entities::test_batch::Column::StationName,
                        entities::test_batch::Column::Total,
                        entities::test_batch::Column::Tested,
                        entities::test_batch::Column::Passed,
                        entities::test_batch::Column::Failed,
                        entities::test_batch::Column::Skipped,
                        entities::test_batch::Column::Started,
                        entities::test_batch::Column::OverallStatus,
                    ])
                    .to_owned(),
            )
            .exec(&self.conn)
            .await
            .map_err(|e| AppError::persistence_unavailable(e.to_string()))?;
        Ok(())
    }

    async fn load_batch(&self, batch_id: Uuid) -> AppResult<Option<TestBatchInfo>> {
        entities::test_batch::Entity::find_by_id(batch_id.to_string())
            .one(&self.conn)
            .await
            .map_err(|e| AppError::persistence_unavailable(e.to_string()))?
            .map(TryInto::try_into)
            .transpose()
    }

    async fn load_all_batches(&self) -> AppResult<Vec<TestBatchInfo>> {
        entities::test_batch::Entity::find()
            .all(&self.conn)
            .await
            .map_err(|e| AppError::persistence_unavailable(e.to_string()))?
            .into_iter()
            .map(TryInto::try_into)
            .collect()
    }

    async fn delete_batch(&self, batch_id: Uuid) -> AppResult<()> {
        let txn = self
            .conn
            .begin()
            .await
            .map_err(|e| AppError::persistence_unavailable(e.to_string()))?;
        entities::test_batch::Entity::delete_by_id(batch_id.to_string())
            .exec(&txn)
            .await
            .map_err(|e| AppError::persistence_unavailable(e.to_string()))?;
        entities::channel_allocation::Entity::delete_many()
            .filter(entities::channel_allocation::Column::BatchId.eq(batch_id.to_string()))
            .exec(&txn)
            .await
            .map_err(|e| AppError::persistence_unavailable(e.to_string()))?;
        txn.commit()
            .await
            .map_err(|e| AppError::persistence_unavailable(e.to_string()))?;
        Ok(())
    }

    async fn save_allocations(&self, allocations: &[ChannelAllocation]) -> AppResult<()> {
        for alloc in allocations {
            let am: entities::channel_allocation::ActiveModel = alloc.into();
            am.insert(&self.conn)
                .await
                .map_err(|e| AppError::persistence_unavailable(e.to_string()))?;
        }
        Ok(())
    }

    async fn load_allocations_by_batch(&self, batch_id: Uuid) -> AppResult<Vec<ChannelAllocation>> {
        entities::channel_allocation::Entity::find()
            .filter(entities::channel_allocation::Column::BatchId.eq(batch_id.to_string()))
            .all(&self.conn)
            .await
            .map_err(|e| AppError::persistence_unavailable(e.to_string()))?
            .into_iter()
            .map(TryInto::try_into)
            .collect()
    }

    async fn clear_allocations_by_batch(&self, batch_id: Uuid) -> AppResult<()> {
        entities::channel_allocation::Entity::delete_many()
            .filter(entities::channel_allocation::Column::BatchId.eq(batch_id.to_string()))
            .exec(&self.conn)
            .await
            .map_err(|e| AppError::persistence_unavailable(e.to_string()))?;
        Ok(())
    }

    async fn save_instance(&self, instance: &ChannelTestInstance) -> AppResult<()> {
        upsert_instance(&self.conn, instance).await
    }

    async fn load_instance(&self, instance_id: Uuid) -> AppResult<Option<ChannelTestInstance>> {
        entities::channel_test_instance::Entity::find_by_id(instance_id.to_string())
            .one(&self.conn)
            .await
            .map_err(|e| AppError::persistence_unavailable(e.to_string()))?
            .map(TryInto::try_into)
            .transpose()
    }

    async fn load_instances_by_batch(&self, batch_id: Uuid) -> AppResult<Vec<ChannelTestInstance>> {
        entities::channel_test_instance::Entity::find()
            .filter(entities::channel_test_instance::Column::BatchId.eq(batch_id.to_string()))
            .all(&self.conn)
            .await
            .map_err(|e| AppError::persistence_unavailable(e.to_string()))?
            .into_iter()
            .map(TryInto::try_into)
            .collect()
    }

    async fn delete_instances_by_batch(&self, batch_id: Uuid) -> AppResult<()> {
        entities::channel_test_instance::Entity::delete_many()
            .filter(entities::channel_test_instance::Column::BatchId.eq(batch_id.to_string()))
            .exec(&self.conn)
            .await
            .map_err(|e| AppError::persistence_unavailable(e.to_string()))?;
        Ok(())
    }

    async fn persist_outcome_and_transition(
        &self,
        outcome: &RawTestOutcome,
        instance: &ChannelTestInstance,
    ) -> AppResult<()> {
        let txn = self
            .conn
            .begin()
            .await
            .map_err(|e| AppError::persistence_unavailable(e.to_string()))?;

        let already_recorded = entities::raw_test_outcome::Entity::find_by_id(outcome.id.to_string())
            .one(&txn)
            .await
            .map_err(|e| AppError::persistence_unavailable(e.to_string()))?
            .is_some();

        if already_recorded {
            txn.commit()
                .await
                .map_err(|e| AppError::persistence_unavailable(e.to_string()))?;
            return Ok(());
        }

        let outcome_am: entities::raw_test_outcome::ActiveModel = outcome.try_into()?;
        outcome_am
            .insert(&txn)
            .await
            .map_err(|e| AppError::persistence_unavailable(e.to_string()))?;

        upsert_instance(&txn, instance).await?;

        txn.commit()
            .await
            .map_err(|e| AppError::persistence_unavailable(e.to_string()))?;
        Ok(())
    }

    async fn has_outcome(&self, outcome_id: Uuid) -> AppResult<bool> {
        Ok(
            entities::raw_test_outcome::Entity::find_by_id(outcome_id.to_string())
                .one(&self.conn)
                .await
                .map_err(|e| AppError::persistence_unavailable(e.to_string()))?
                .is_some(),
        )
    }

    async fn load_outcomes_by_instance(&self, instance_id: Uuid) -> AppResult<Vec<RawTestOutcome>> {
        entities::raw_test_outcome::Entity::find()
            .filter(entities::raw_test_outcome::Column::InstanceId.eq(instance_id.to_string()))
            .all(&self.conn)
            .await
            .map_err(|e| AppError::persistence_unavailable(e.to_string()))?
            .into_iter()
            .map(TryInto::try_into)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        AlarmSetpoints, BatchStatistics, ChannelTestInstance, ModuleType, OverallBatchStatus,
        PointDataType, PowerSupplyType, SubTestItem,
    };

    fn sample_definition() -> ChannelPointDefinition {
        ChannelPointDefinition {
            id: Uuid::new_v4(),
            tag: "TAG001".to_string(),
            variable_name: "Var1".to_string(),
            description: String::new(),
            station_name: "站1".to_string(),
            module_name: "模块1".to_string(),
            module_type: ModuleType::AI,
            channel_number: "1".to_string(),
            data_type: PointDataType::Float,
            power_supply_type: PowerSupplyType::Sourced,
            wire_system: None,
            plc_absolute_address: "%MD100".to_string(),
            plc_communication_address: "40001".to_string(),
            range_lo: Some(0.0),
            range_hi: Some(100.0),
            eng_unit: Some("C".to_string()),
            alarm_setpoints: AlarmSetpoints::default(),
            maintenance: None,
            remarks: None,
            sequence_number: 1,
        }
    }

    #[tokio::test]
    async fn definitions_round_trip_through_sqlite() {
        let store = SqlitePersistenceStore::new(Some(Path::new(":memory:"))).await.unwrap();
        let def = sample_definition();
        store.save_definitions(&[def.clone()]).await.unwrap();

        let loaded = store.load_definitions().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, def.id);
        assert_eq!(loaded[0].tag, def.tag);
        assert_eq!(loaded[0].module_type, def.module_type);
        assert_eq!(loaded[0].range_lo, def.range_lo);
    }

    #[tokio::test]
    async fn batch_and_instance_round_trip_and_outcome_is_idempotent() {
        let store = SqlitePersistenceStore::new(Some(Path::new(":memory:"))).await.unwrap();
        let def = sample_definition();
        store.save_definitions(&[def.clone()]).await.unwrap();

        let batch = TestBatchInfo {
            batch_id: Uuid::new_v4(),
            batch_name: "批次1".to_string(),
            product_model: None,
            serial_number: None,
            station_name: Some(def.station_name.clone()),
            created_at: chrono::Utc::now(),
            statistics: BatchStatistics::default(),
            overall_status: OverallBatchStatus::NotStarted,
        };
        store.save_batch(&batch).await.unwrap();
        assert!(store.load_batch(batch.batch_id).await.unwrap().is_some());

        let instance = ChannelTestInstance::new(Uuid::new_v4(), def.id, batch.batch_id);
        store.save_instance(&instance).await.unwrap();

        let outcome = RawTestOutcome::new(
            instance.instance_id,
            SubTestItem::HardPoint,
            true,
            None,
            chrono::Utc::now(),
            chrono::Utc::now(),
            None,
        );
        store.persist_outcome_and_transition(&outcome, &instance).await.unwrap();
        assert!(store.has_outcome(outcome.id).await.unwrap());

        // Replaying the same outcome id must stay a no-op (P7).
        store.persist_outcome_and_transition(&outcome, &instance).await.unwrap();
        let outcomes = store.load_outcomes_by_instance(instance.instance_id).await.unwrap();
        assert_eq!(outcomes.len(), 1);

        let loaded_instance = store.load_instance(instance.instance_id).await.unwrap().unwrap();
        assert_eq!(loaded_instance.instance_id, instance.instance_id);
    }

    #[tokio::test]
    async fn delete_batch_also_clears_its_allocations() {
        let store = SqlitePersistenceStore::new(Some(Path::new(":memory:"))).await.unwrap();
        let def = sample_definition();
        let batch_id = Uuid::new_v4();
        let allocation = ChannelAllocation {
            definition_id: def.id,
            batch_id,
            batch_name: "批次1".to_string(),
            test_channel_id: Some(Uuid::new_v4()),
            test_comm_address: Some("40001".to_string()),
        };
        store.save_allocations(&[allocation]).await.unwrap();
        assert_eq!(store.load_allocations_by_batch(batch_id).await.unwrap().len(), 1);

        store.delete_batch(batch_id).await.unwrap();
        assert!(store.load_allocations_by_batch(batch_id).await.unwrap().is_empty());
    }
}

async fn upsert_instance<C: ConnectionTrait>(
    db: &C,
    instance: &ChannelTestInstance,
) -> AppResult<()> {
    let am: entities::channel_test_instance::ActiveModel = instance.try_into()?;
    entities::channel_test_instance::Entity::insert(am)
        .on_conflict(
            sea_orm::sea_query::OnConflict::column(entities::channel_test_instance::Column::InstanceId)
                .update_columns([
                    entities::channel_test_instance::Column::OverallStatus,
                    entities::channel_test_instance::Column::SubTestResultsJson,
                    entities::channel_test_instance::Column::StartTime,
                    entities::channel_test_instance::Column::FinalTestTime,
                    entities::channel_test_instance::Column::DurationMs,
                    entities::channel_test_instance::Column::RetriesCount,
                    entities::channel_test_instance::Column::CurrentOperator,
                    entities::channel_test_instance::Column::ErrorMessage,
                    entities::channel_test_instance::Column::ErrorNotesJson,
                    entities::channel_test_instance::Column::AnalogReadingsJson,
                ])
                .to_owned(),
        )
        .exec(db)
        .await
        .map_err(|e| AppError::persistence_unavailable(e.to_string()))?;
    Ok(())
}
