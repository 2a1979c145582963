//! 队列引擎
//!
//! 协调存储、状态机、服务顺序、转换编排与过期清扫的核心引擎；
//! 存储放在读写锁之后，写锁保证同一条目的状态转换串行执行

use chrono::{NaiveDate, NaiveTime};
use clinic_core::{
    PeriodOfDay, ProcedureType, QueueEntry, QueueStatus, Result,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::conversion::{
    AppointmentService, AvailabilityCheck, Clock, ConversionOrchestrator, ConversionOutcome,
    ConversionRequest,
};
use crate::ordering;
use crate::state_machine::{QueueEvent, QueueStateMachine};
use crate::store::{QueueFilter, QueueStats, QueueStore};
use crate::sweeper::{ExpirySweeper, SweepReport};

/// 引擎配置
#[derive(Debug, Clone)]
pub struct QueueEngineConfig {
    /// 外部调用超时
    pub call_timeout: Duration,
    /// 无偏好日期条目的最大等待时长
    pub max_waiting_age: chrono::Duration,
}

impl Default for QueueEngineConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(10),
            max_waiting_age: chrono::Duration::days(30),
        }
    }
}

/// 入队请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnqueueRequest {
    pub patient_id: i64,
    pub patient_name: String,
    pub dentist_id: Option<i64>,
    pub dentist_name: Option<String>,
    pub accepts_any_dentist: bool,
    pub preferred_date: Option<NaiveDate>,
    pub preferred_start_time: Option<NaiveTime>,
    pub preferred_end_time: Option<NaiveTime>,
    pub preferred_period: PeriodOfDay,
    pub accepts_any_schedule: bool,
    pub procedure_type: Option<ProcedureType>,
    pub priority: i32,
    pub created_by: Option<String>,
}

impl EnqueueRequest {
    /// 最简请求：接受任意牙医与任意时段
    pub fn basic(patient_id: i64, patient_name: &str, priority: i32) -> Self {
        Self {
            patient_id,
            patient_name: patient_name.to_string(),
            dentist_id: None,
            dentist_name: None,
            accepts_any_dentist: true,
            preferred_date: None,
            preferred_start_time: None,
            preferred_end_time: None,
            preferred_period: PeriodOfDay::Any,
            accepts_any_schedule: true,
            procedure_type: None,
            priority,
            created_by: None,
        }
    }
}

/// 队列引擎
pub struct QueueEngine {
    store: Arc<RwLock<QueueStore>>,
    state_machine: Arc<QueueStateMachine>,
    orchestrator: ConversionOrchestrator,
    sweeper: ExpirySweeper,
    clock: Arc<dyn Clock>,
}

impl QueueEngine {
    /// 创建新的队列引擎
    ///
    /// 外部协作系统（可用性检查、预约服务）与时钟通过显式依赖
    /// 注入传入；引擎是存储的唯一持有者
    pub fn new(
        availability: Arc<dyn AvailabilityCheck>,
        appointments: Arc<dyn AppointmentService>,
        clock: Arc<dyn Clock>,
        config: QueueEngineConfig,
    ) -> Self {
        let store = Arc::new(RwLock::new(QueueStore::new()));
        let state_machine = Arc::new(QueueStateMachine::new());

        let orchestrator = ConversionOrchestrator::new(
            store.clone(),
            state_machine.clone(),
            availability,
            appointments,
            clock.clone(),
            config.call_timeout,
        );

        Self {
            store,
            state_machine,
            orchestrator,
            sweeper: ExpirySweeper::new(config.max_waiting_age),
            clock,
        }
    }

    /// 把患者加入候诊队列
    pub async fn enqueue(&self, request: EnqueueRequest) -> Result<QueueEntry> {
        let now = self.clock.now();
        let mut entry = QueueEntry::new(0, request.patient_id, request.patient_name, request.priority, now);
        entry.dentist_id = request.dentist_id;
        entry.dentist_name = request.dentist_name;
        entry.accepts_any_dentist = request.accepts_any_dentist;
        entry.preferred_date = request.preferred_date;
        entry.preferred_start_time = request.preferred_start_time;
        entry.preferred_end_time = request.preferred_end_time;
        entry.preferred_period = request.preferred_period;
        entry.accepts_any_schedule = request.accepts_any_schedule;
        entry.procedure_type = request.procedure_type;
        entry.created_by = request.created_by;

        let mut store = self.store.write().await;
        store.insert(entry)
    }

    /// 获取条目快照
    pub async fn entry(&self, id: i64) -> Result<QueueEntry> {
        let store = self.store.read().await;
        store.get(id).cloned()
    }

    /// 通知患者有可用时段
    pub async fn notify(&self, id: i64) -> Result<QueueEntry> {
        self.apply_event(id, QueueEvent::Notify).await
    }

    /// 取消候诊
    pub async fn cancel(&self, id: i64) -> Result<QueueEntry> {
        self.apply_event(id, QueueEvent::Cancel).await
    }

    /// 硬删除条目（任何状态均允许）
    pub async fn remove(&self, id: i64) -> Result<QueueEntry> {
        let mut store = self.store.write().await;
        store.delete(id)
    }

    /// 把已通知条目转换为已确认预约
    pub async fn convert(&self, request: &ConversionRequest) -> Result<ConversionOutcome> {
        self.orchestrator.convert(request).await
    }

    /// 对账：查询预约系统中是否已存在匹配的预约
    pub async fn reconcile(&self, request: &ConversionRequest) -> Result<Option<clinic_core::Appointment>> {
        self.orchestrator.reconcile(request).await
    }

    /// 执行一次过期清扫，截止点取当前时刻
    pub async fn sweep_expired(&self) -> SweepReport {
        let now = self.clock.now();
        let mut store = self.store.write().await;
        self.sweeper.sweep(&mut store, &self.state_machine, now, now)
    }

    /// 活跃条目的服务顺序
    pub async fn service_order(&self) -> Vec<QueueEntry> {
        let store = self.store.read().await;
        let active: Vec<QueueEntry> = store.list_active().into_iter().cloned().collect();
        ordering::service_order(active)
    }

    /// 按牙医列出条目
    pub async fn list_by_dentist(&self, dentist_id: i64) -> Vec<QueueEntry> {
        let store = self.store.read().await;
        store.list_by_dentist(dentist_id).into_iter().cloned().collect()
    }

    /// 按患者列出条目
    pub async fn list_by_patient(&self, patient_id: i64) -> Vec<QueueEntry> {
        let store = self.store.read().await;
        store.list_by_patient(patient_id).into_iter().cloned().collect()
    }

    /// 按状态列出条目
    pub async fn list_by_status(&self, status: QueueStatus) -> Vec<QueueEntry> {
        let store = self.store.read().await;
        store.list_by_status(status).into_iter().cloned().collect()
    }

    /// 条件查询
    pub async fn query(&self, filter: &QueueFilter) -> Vec<QueueEntry> {
        let store = self.store.read().await;
        store.query(filter)
    }

    /// 队列统计
    pub async fn stats(&self) -> QueueStats {
        let store = self.store.read().await;
        store.stats()
    }

    async fn apply_event(&self, id: i64, event: QueueEvent) -> Result<QueueEntry> {
        let now = self.clock.now();
        let mut store = self.store.write().await;
        let entry = store.get_mut(id)?;
        self.state_machine.apply(entry, &event, now)?;
        Ok(entry.clone())
    }
}
