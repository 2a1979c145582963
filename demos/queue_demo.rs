//! 候诊队列演示程序
//!
//! 展示队列引擎的核心功能：入队、服务顺序、通知、转换与过期清扫

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use clinic_core::{
    Appointment, AppointmentStatus, NewAppointment, ProcedureType, Result as ClinicResult,
};
use clinic_queue::{
    AppointmentService, AvailabilityCheck, ConversionRequest, EnqueueRequest, QueueEngine,
    QueueEngineConfig, SystemClock,
};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// 演示用内存预约后端：全部时段空闲，预约ID自增
struct DemoScheduler {
    next_id: AtomicI64,
}

#[async_trait]
impl AvailabilityCheck for DemoScheduler {
    async fn check_available(
        &self,
        _dentist_id: i64,
        _date: NaiveDate,
        _start_time: NaiveTime,
        _end_time: NaiveTime,
    ) -> ClinicResult<bool> {
        Ok(true)
    }
}

#[async_trait]
impl AppointmentService for DemoScheduler {
    async fn create_appointment(&self, request: &NewAppointment) -> ClinicResult<i64> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        println!(
            "   后端创建预约 {}: 牙医 {} / 患者 {} / {} {}",
            id, request.dentist_id, request.patient_id, request.date, request.start_time
        );
        Ok(id)
    }

    async fn cancel_appointment(&self, appointment_id: i64) -> ClinicResult<()> {
        println!("   后端取消预约 {}", appointment_id);
        Ok(())
    }

    async fn find_appointment(
        &self,
        _dentist_id: i64,
        _date: NaiveDate,
        _start_time: NaiveTime,
    ) -> ClinicResult<Option<Appointment>> {
        Ok(None)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 初始化日志
    tracing_subscriber::fmt::init();

    let scheduler = Arc::new(DemoScheduler {
        next_id: AtomicI64::new(500),
    });
    let engine = QueueEngine::new(
        scheduler.clone(),
        scheduler,
        Arc::new(SystemClock),
        QueueEngineConfig::default(),
    );

    println!("🦷 牙科诊所候诊队列演示\n");

    // 1. 患者入队
    let mut emergency = EnqueueRequest::basic(100, "Ana Souza", 9);
    emergency.procedure_type = Some(ProcedureType::Emergency);
    let first = engine.enqueue(emergency).await?;

    let mut cleaning = EnqueueRequest::basic(101, "Bruno Lima", 4);
    cleaning.procedure_type = Some(ProcedureType::Cleaning);
    engine.enqueue(cleaning).await?;

    let mut canal = EnqueueRequest::basic(102, "Carla Mendes", 7);
    canal.procedure_type = Some(ProcedureType::RootCanal);
    engine.enqueue(canal).await?;
    println!("✅ 3 位患者已加入候诊队列");

    // 2. 服务顺序
    println!("\n📋 当前服务顺序:");
    for (position, entry) in engine.service_order().await.iter().enumerate() {
        println!(
            "   {}. {} (优先级 {}, {:?})",
            position + 1,
            entry.patient_name,
            entry.priority,
            entry.priority_band()
        );
    }

    // 3. 通知并转换队首患者
    let notified = engine.notify(first.id).await?;
    println!(
        "\n📞 已通知 {} (联系次数 {})",
        notified.patient_name, notified.contact_attempts
    );

    let outcome = engine
        .convert(&ConversionRequest {
            entry_id: first.id,
            dentist_id: 7,
            date: NaiveDate::from_ymd_opt(2026, 3, 20).unwrap(),
            start_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(10, 30, 0).unwrap(),
        })
        .await?;
    println!(
        "✅ {} 已转为预约 {} ({:?})",
        outcome.entry.patient_name,
        outcome.appointment_id,
        AppointmentStatus::Scheduled
    );

    // 4. 过期清扫（队列刚建立，不应有过期条目）
    let report = engine.sweep_expired().await;
    println!(
        "\n🧹 过期清扫: 检查 {} 条, 过期 {} 条, 跳过 {} 条",
        report.examined, report.expired, report.skipped
    );

    // 5. 队列统计
    let stats = engine.stats().await;
    println!("\n📊 队列统计:");
    println!("   总条目: {}", stats.total_entries);
    println!("   等待中: {}", stats.waiting);
    println!("   已通知: {}", stats.notified);
    println!("   已转换: {}", stats.converted);

    Ok(())
}
