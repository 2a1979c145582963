//! 测试辅助：确定性时钟与内存版外部协作系统

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use clinic_core::{Appointment, AppointmentStatus, ClinicError, NewAppointment, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::conversion::{AppointmentService, AvailabilityCheck, Clock};

/// 手动推进的测试时钟
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn advance(&self, delta: chrono::Duration) {
        let mut now = self.now.lock().unwrap();
        *now += delta;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// 固定应答的可用性检查
pub struct MockAvailability {
    available: AtomicBool,
}

impl MockAvailability {
    pub fn new(available: bool) -> Self {
        Self {
            available: AtomicBool::new(available),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }
}

#[async_trait]
impl AvailabilityCheck for MockAvailability {
    async fn check_available(
        &self,
        _dentist_id: i64,
        _date: NaiveDate,
        _start_time: NaiveTime,
        _end_time: NaiveTime,
    ) -> Result<bool> {
        Ok(self.available.load(Ordering::SeqCst))
    }
}

/// 内存版预约服务
pub struct MockScheduler {
    next_id: Mutex<i64>,
    created: Mutex<Vec<Appointment>>,
    cancelled: Mutex<Vec<i64>>,
    fail_next: Mutex<Option<String>>,
    unknown_next: AtomicBool,
}

impl MockScheduler {
    pub fn new(first_id: i64) -> Self {
        Self {
            next_id: Mutex::new(first_id),
            created: Mutex::new(Vec::new()),
            cancelled: Mutex::new(Vec::new()),
            fail_next: Mutex::new(None),
            unknown_next: AtomicBool::new(false),
        }
    }

    pub fn fail_next_create(&self, reason: &str) {
        *self.fail_next.lock().unwrap() = Some(reason.to_string());
    }

    pub fn unknown_next_create(&self) {
        self.unknown_next.store(true, Ordering::SeqCst);
    }

    pub fn created_count(&self) -> usize {
        self.created.lock().unwrap().len()
    }

    pub fn cancelled_ids(&self) -> Vec<i64> {
        self.cancelled.lock().unwrap().clone()
    }
}

#[async_trait]
impl AppointmentService for MockScheduler {
    async fn create_appointment(&self, request: &NewAppointment) -> Result<i64> {
        if self.unknown_next.swap(false, Ordering::SeqCst) {
            return Err(ClinicError::UnknownOutcome(
                "connection lost after request was sent".to_string(),
            ));
        }
        if let Some(reason) = self.fail_next.lock().unwrap().take() {
            return Err(ClinicError::AppointmentCreationFailed(reason));
        }

        let mut next_id = self.next_id.lock().unwrap();
        let id = *next_id;
        *next_id += 1;

        self.created.lock().unwrap().push(Appointment {
            id,
            dentist_id: request.dentist_id,
            patient_id: request.patient_id,
            date: request.date,
            start_time: request.start_time,
            end_time: request.end_time,
            status: AppointmentStatus::Scheduled,
            procedure_type: request.procedure_type,
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn cancel_appointment(&self, appointment_id: i64) -> Result<()> {
        self.cancelled.lock().unwrap().push(appointment_id);
        Ok(())
    }

    async fn find_appointment(
        &self,
        dentist_id: i64,
        date: NaiveDate,
        start_time: NaiveTime,
    ) -> Result<Option<Appointment>> {
        let cancelled = self.cancelled.lock().unwrap();
        let found = self
            .created
            .lock()
            .unwrap()
            .iter()
            .find(|a| {
                a.dentist_id == dentist_id
                    && a.date == date
                    && a.start_time == start_time
                    && !cancelled.contains(&a.id)
            })
            .cloned();
        Ok(found)
    }
}
