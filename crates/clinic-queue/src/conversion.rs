//! 候诊转预约编排器
//!
//! 把一个已通知的候诊条目转换为已确认的预约：可用性检查、
//! 预约创建与队列状态转换三步构成一个逻辑操作。三步跨越
//! 队列存储与外部预约系统，不具备跨系统原子性；创建成功后
//! 队列转换失败时执行补偿性取消（saga 模式）

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use clinic_core::utils::generate_correlation_id;
use clinic_core::{Appointment, ClinicError, NewAppointment, QueueEntry, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::state_machine::{QueueEvent, QueueStateMachine};
use crate::store::QueueStore;

/// 时钟接口，测试中可注入固定时钟
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// 系统时钟
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// 可用性检查接口（外部协作系统）
#[async_trait]
pub trait AvailabilityCheck: Send + Sync {
    /// 查询牙医在给定日期时段是否空闲
    async fn check_available(
        &self,
        dentist_id: i64,
        date: NaiveDate,
        start_time: NaiveTime,
        end_time: NaiveTime,
    ) -> Result<bool>;
}

/// 预约服务接口（外部协作系统）
#[async_trait]
pub trait AppointmentService: Send + Sync {
    /// 创建预约，返回新预约ID
    async fn create_appointment(&self, request: &NewAppointment) -> Result<i64>;

    /// 取消预约（仅用于补偿动作）
    async fn cancel_appointment(&self, appointment_id: i64) -> Result<()>;

    /// 按目标参数查找预约（用于结果未知时的对账）
    async fn find_appointment(
        &self,
        dentist_id: i64,
        date: NaiveDate,
        start_time: NaiveTime,
    ) -> Result<Option<Appointment>>;
}

/// 转换请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionRequest {
    pub entry_id: i64,
    pub dentist_id: i64,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

/// 转换成功的结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionOutcome {
    pub entry: QueueEntry,
    pub appointment_id: i64,
}

/// 转换编排器
///
/// 外部调用都在调用方配置的超时下执行；请求已发出后超时属于
/// 结果未知（UnknownOutcome），不可盲目重试，应先通过
/// [`ConversionOrchestrator::reconcile`] 对账
pub struct ConversionOrchestrator {
    store: Arc<RwLock<QueueStore>>,
    state_machine: Arc<QueueStateMachine>,
    availability: Arc<dyn AvailabilityCheck>,
    appointments: Arc<dyn AppointmentService>,
    clock: Arc<dyn Clock>,
    call_timeout: Duration,
}

impl ConversionOrchestrator {
    pub fn new(
        store: Arc<RwLock<QueueStore>>,
        state_machine: Arc<QueueStateMachine>,
        availability: Arc<dyn AvailabilityCheck>,
        appointments: Arc<dyn AppointmentService>,
        clock: Arc<dyn Clock>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            store,
            state_machine,
            availability,
            appointments,
            clock,
            call_timeout,
        }
    }

    /// 执行转换
    ///
    /// - 时段不可用：返回 SlotUnavailable，条目不变
    /// - 预约创建失败：返回 AppointmentCreationFailed，条目不变
    /// - 创建后队列转换失败（例如并发取消）：补偿性取消刚创建的
    ///   预约，返回转换错误
    pub async fn convert(&self, request: &ConversionRequest) -> Result<ConversionOutcome> {
        let correlation_id = generate_correlation_id();
        tracing::info!(
            "Converting queue entry {} for dentist {} on {} ({})",
            request.entry_id,
            request.dentist_id,
            request.date,
            correlation_id
        );

        // 提前校验条目存在，并取其患者与诊疗项目信息
        let entry_snapshot = {
            let store = self.store.read().await;
            store.get(request.entry_id)?.clone()
        };

        // 第一步：可用性检查
        let available = match tokio::time::timeout(
            self.call_timeout,
            self.availability.check_available(
                request.dentist_id,
                request.date,
                request.start_time,
                request.end_time,
            ),
        )
        .await
        {
            Err(_) => {
                return Err(ClinicError::UnknownOutcome(format!(
                    "availability check timed out after {:?} ({})",
                    self.call_timeout, correlation_id
                )))
            }
            Ok(result) => result?,
        };

        if !available {
            tracing::warn!(
                "Slot unavailable for dentist {} on {} {}-{} ({})",
                request.dentist_id,
                request.date,
                request.start_time,
                request.end_time,
                correlation_id
            );
            return Err(ClinicError::SlotUnavailable {
                dentist_id: request.dentist_id,
                date: request.date,
                start_time: request.start_time,
                end_time: request.end_time,
            });
        }

        // 第二步：请求外部系统创建预约
        let new_appointment = NewAppointment {
            dentist_id: request.dentist_id,
            patient_id: entry_snapshot.patient_id,
            date: request.date,
            start_time: request.start_time,
            end_time: request.end_time,
            procedure_type: entry_snapshot.procedure_type,
        };

        let appointment_id = match tokio::time::timeout(
            self.call_timeout,
            self.appointments.create_appointment(&new_appointment),
        )
        .await
        {
            // 请求已发出，结果未知：不得重试创建，先对账
            Err(_) => {
                tracing::error!(
                    "Appointment creation timed out for entry {} ({})",
                    request.entry_id,
                    correlation_id
                );
                return Err(ClinicError::UnknownOutcome(format!(
                    "appointment creation timed out after {:?} ({})",
                    self.call_timeout, correlation_id
                )));
            }
            Ok(Err(ClinicError::UnknownOutcome(msg))) => {
                return Err(ClinicError::UnknownOutcome(msg))
            }
            Ok(Err(e)) => {
                tracing::warn!(
                    "Appointment creation failed for entry {}: {} ({})",
                    request.entry_id,
                    e,
                    correlation_id
                );
                return Err(ClinicError::AppointmentCreationFailed(e.to_string()));
            }
            Ok(Ok(id)) => id,
        };

        // 第三步：驱动队列状态机的转换（写锁串行化同一条目的并发转换）
        let transition = {
            let mut store = self.store.write().await;
            let now = self.clock.now();
            let event = QueueEvent::Convert { appointment_id };
            store.get_mut(request.entry_id).and_then(|entry| {
                self.state_machine
                    .apply(entry, &event, now)
                    .map(|_| entry.clone())
            })
        };

        match transition {
            Ok(entry) => {
                tracing::info!(
                    "Queue entry {} converted to appointment {} ({})",
                    request.entry_id,
                    appointment_id,
                    correlation_id
                );
                Ok(ConversionOutcome {
                    entry,
                    appointment_id,
                })
            }
            Err(e) => {
                // 预约已创建但队列转换失败：补偿性取消
                tracing::error!(
                    "Convert transition failed for entry {} after creating appointment {}: {} ({})",
                    request.entry_id,
                    appointment_id,
                    e,
                    correlation_id
                );
                self.compensate(appointment_id, &correlation_id).await;
                Err(e)
            }
        }
    }

    /// 对账：按目标参数查询预约系统中是否已存在匹配的预约
    ///
    /// 在收到 UnknownOutcome 之后、任何重试或补偿之前调用
    pub async fn reconcile(&self, request: &ConversionRequest) -> Result<Option<Appointment>> {
        self.appointments
            .find_appointment(request.dentist_id, request.date, request.start_time)
            .await
    }

    async fn compensate(&self, appointment_id: i64, correlation_id: &str) {
        match tokio::time::timeout(
            self.call_timeout,
            self.appointments.cancel_appointment(appointment_id),
        )
        .await
        {
            Ok(Ok(())) => {
                tracing::info!(
                    "Compensating cancel of appointment {} succeeded ({})",
                    appointment_id,
                    correlation_id
                );
            }
            Ok(Err(e)) => {
                // 补偿失败留给人工对账，此处只记录
                tracing::error!(
                    "Compensating cancel of appointment {} failed: {} ({})",
                    appointment_id,
                    e,
                    correlation_id
                );
            }
            Err(_) => {
                tracing::error!(
                    "Compensating cancel of appointment {} timed out ({})",
                    appointment_id,
                    correlation_id
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ManualClock, MockAvailability, MockScheduler};
    use clinic_core::QueueStatus;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap()
    }

    fn request(entry_id: i64) -> ConversionRequest {
        ConversionRequest {
            entry_id,
            dentist_id: 7,
            date: NaiveDate::from_ymd_opt(2026, 3, 20).unwrap(),
            start_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(10, 30, 0).unwrap(),
        }
    }

    struct Fixture {
        store: Arc<RwLock<QueueStore>>,
        scheduler: Arc<MockScheduler>,
        orchestrator: ConversionOrchestrator,
    }

    async fn fixture(available: bool, notified: bool) -> Fixture {
        let store = Arc::new(RwLock::new(QueueStore::new()));
        let sm = Arc::new(QueueStateMachine::new());
        let clock = Arc::new(ManualClock::new(t0()));
        let scheduler = Arc::new(MockScheduler::new(555));

        {
            let mut guard = store.write().await;
            let entry = QueueEntry::new(0, 100, "Ana Souza".to_string(), 9, t0());
            let mut entry = guard.insert(entry).unwrap();
            if notified {
                sm.apply(&mut entry, &QueueEvent::Notify, t0()).unwrap();
                guard.upsert(entry).unwrap();
            }
        }

        let orchestrator = ConversionOrchestrator::new(
            store.clone(),
            sm,
            Arc::new(MockAvailability::new(available)),
            scheduler.clone(),
            clock,
            Duration::from_secs(5),
        );

        Fixture {
            store,
            scheduler,
            orchestrator,
        }
    }

    #[tokio::test]
    async fn test_successful_conversion() {
        let f = fixture(true, true).await;

        let outcome = f.orchestrator.convert(&request(1)).await.unwrap();
        assert_eq!(outcome.appointment_id, 555);
        assert_eq!(outcome.entry.status, QueueStatus::Converted);
        assert_eq!(outcome.entry.appointment_id, Some(555));

        let store = f.store.read().await;
        assert_eq!(store.get(1).unwrap().status, QueueStatus::Converted);
        assert_eq!(f.scheduler.created_count(), 1);
        assert!(f.scheduler.cancelled_ids().is_empty());
    }

    #[tokio::test]
    async fn test_slot_unavailable_leaves_entry_untouched() {
        let f = fixture(false, true).await;

        let err = f.orchestrator.convert(&request(1)).await.unwrap_err();
        assert!(matches!(err, ClinicError::SlotUnavailable { .. }));

        let store = f.store.read().await;
        let entry = store.get(1).unwrap();
        assert_eq!(entry.status, QueueStatus::Notified);
        assert!(entry.appointment_id.is_none());
        assert_eq!(f.scheduler.created_count(), 0);
    }

    #[tokio::test]
    async fn test_creation_failure_leaves_entry_untouched() {
        let f = fixture(true, true).await;
        f.scheduler.fail_next_create("backend rejected the slot");

        let err = f.orchestrator.convert(&request(1)).await.unwrap_err();
        assert!(matches!(err, ClinicError::AppointmentCreationFailed(_)));

        let store = f.store.read().await;
        assert_eq!(store.get(1).unwrap().status, QueueStatus::Notified);
    }

    #[tokio::test]
    async fn test_convert_from_waiting_compensates_created_appointment() {
        // 条目未被通知：第三步转换必然失败，已创建的预约被补偿取消
        let f = fixture(true, false).await;

        let err = f.orchestrator.convert(&request(1)).await.unwrap_err();
        assert!(matches!(err, ClinicError::InvalidTransition { .. }));

        let store = f.store.read().await;
        let entry = store.get(1).unwrap();
        assert_eq!(entry.status, QueueStatus::Waiting);
        assert!(entry.appointment_id.is_none());
        assert_eq!(f.scheduler.created_count(), 1);
        assert_eq!(f.scheduler.cancelled_ids(), vec![555]);
    }

    #[tokio::test]
    async fn test_second_conversion_fails_without_duplicate_appointment_linkage() {
        let f = fixture(true, true).await;

        f.orchestrator.convert(&request(1)).await.unwrap();
        let err = f.orchestrator.convert(&request(1)).await.unwrap_err();
        assert!(matches!(err, ClinicError::InvalidTransition { .. }));

        // 第一次成功的关联保持不变
        let store = f.store.read().await;
        assert_eq!(store.get(1).unwrap().appointment_id, Some(555));
    }

    #[tokio::test]
    async fn test_missing_entry_fails_before_external_calls() {
        let f = fixture(true, true).await;

        let err = f.orchestrator.convert(&request(42)).await.unwrap_err();
        assert!(matches!(err, ClinicError::NotFound(_)));
        assert_eq!(f.scheduler.created_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_outcome_propagates_without_compensation() {
        let f = fixture(true, true).await;
        f.scheduler.unknown_next_create();

        let err = f.orchestrator.convert(&request(1)).await.unwrap_err();
        assert!(matches!(err, ClinicError::UnknownOutcome(_)));

        // 不自动补偿也不自动重试，交由对账
        assert!(f.scheduler.cancelled_ids().is_empty());
        let store = f.store.read().await;
        assert_eq!(store.get(1).unwrap().status, QueueStatus::Notified);
    }

    /// 一直不应答的预约服务：用于触发真实的调用超时
    struct StallingScheduler {
        cancelled: std::sync::Mutex<Vec<i64>>,
    }

    #[async_trait::async_trait]
    impl AppointmentService for StallingScheduler {
        async fn create_appointment(&self, _request: &clinic_core::NewAppointment) -> Result<i64> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(1)
        }

        async fn cancel_appointment(&self, appointment_id: i64) -> Result<()> {
            self.cancelled.lock().unwrap().push(appointment_id);
            Ok(())
        }

        async fn find_appointment(
            &self,
            _dentist_id: i64,
            _date: NaiveDate,
            _start_time: NaiveTime,
        ) -> Result<Option<Appointment>> {
            Ok(None)
        }
    }

    /// 一直不应答的可用性检查
    struct StallingAvailability;

    #[async_trait::async_trait]
    impl AvailabilityCheck for StallingAvailability {
        async fn check_available(
            &self,
            _dentist_id: i64,
            _date: NaiveDate,
            _start_time: NaiveTime,
            _end_time: NaiveTime,
        ) -> Result<bool> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(true)
        }
    }

    async fn notified_store() -> Arc<RwLock<QueueStore>> {
        let store = Arc::new(RwLock::new(QueueStore::new()));
        let sm = QueueStateMachine::new();
        {
            let mut guard = store.write().await;
            let entry = QueueEntry::new(0, 100, "Ana Souza".to_string(), 9, t0());
            let mut entry = guard.insert(entry).unwrap();
            sm.apply(&mut entry, &QueueEvent::Notify, t0()).unwrap();
            guard.upsert(entry).unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_creation_timeout_elapsed_is_unknown_outcome_without_compensation() {
        let store = notified_store().await;
        let scheduler = Arc::new(StallingScheduler {
            cancelled: std::sync::Mutex::new(Vec::new()),
        });

        let orchestrator = ConversionOrchestrator::new(
            store.clone(),
            Arc::new(QueueStateMachine::new()),
            Arc::new(MockAvailability::new(true)),
            scheduler.clone(),
            Arc::new(ManualClock::new(t0())),
            Duration::from_millis(50),
        );

        let err = orchestrator.convert(&request(1)).await.unwrap_err();
        assert!(matches!(err, ClinicError::UnknownOutcome(_)));

        // 结果未知：不补偿、不改条目，留给对账
        assert!(scheduler.cancelled.lock().unwrap().is_empty());
        let guard = store.read().await;
        assert_eq!(guard.get(1).unwrap().status, QueueStatus::Notified);
    }

    #[tokio::test]
    async fn test_availability_timeout_elapsed_is_unknown_outcome_before_creation() {
        let store = notified_store().await;
        let scheduler = Arc::new(MockScheduler::new(555));

        let orchestrator = ConversionOrchestrator::new(
            store.clone(),
            Arc::new(QueueStateMachine::new()),
            Arc::new(StallingAvailability),
            scheduler.clone(),
            Arc::new(ManualClock::new(t0())),
            Duration::from_millis(50),
        );

        let err = orchestrator.convert(&request(1)).await.unwrap_err();
        assert!(matches!(err, ClinicError::UnknownOutcome(_)));
        assert_eq!(scheduler.created_count(), 0);

        let guard = store.read().await;
        assert_eq!(guard.get(1).unwrap().status, QueueStatus::Notified);
    }

    #[tokio::test]
    async fn test_reconcile_queries_appointment_service() {
        let f = fixture(true, true).await;
        assert!(f.orchestrator.reconcile(&request(1)).await.unwrap().is_none());

        f.orchestrator.convert(&request(1)).await.unwrap();
        let found = f.orchestrator.reconcile(&request(1)).await.unwrap();
        assert_eq!(found.map(|a| a.id), Some(555));
    }
}
