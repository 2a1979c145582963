//! 外部系统连接器模块
//!
//! 诊所后端 REST API 的连接器：可用性查询与预约创建/取消/查找。
//! 请求发出后的超时映射为 UnknownOutcome，调用方不得据此重试创建

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use clinic_core::{
    Appointment, AppointmentStatus, ClinicError, NewAppointment, ProcedureType, Result,
};
use clinic_queue::{AppointmentService, AvailabilityCheck};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// 认证配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AuthConfig {
    None,
    BasicAuth { username: String, password: String },
    ApiKey { key: String, header: Option<String> },
    BearerToken { token: String },
}

/// 调度连接器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulingConnectorConfig {
    pub name: String,
    pub endpoint: String,
    pub authentication: AuthConfig,
    /// 请求超时（秒）
    pub request_timeout_secs: u64,
}

impl SchedulingConnectorConfig {
    pub fn new(name: &str, endpoint: &str) -> Self {
        Self {
            name: name.to_string(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            authentication: AuthConfig::None,
            request_timeout_secs: 10,
        }
    }
}

/// 可用性查询应答
#[derive(Debug, Deserialize)]
struct AvailabilityResponse {
    disponivel: bool,
}

/// 预约创建应答
#[derive(Debug, Deserialize)]
struct CreatedAppointmentResponse {
    id: i64,
}

/// 后端预约记录（葡语字段的线上契约）
#[derive(Debug, Deserialize)]
struct AppointmentDto {
    id: i64,
    #[serde(rename = "dentistaId")]
    dentist_id: i64,
    #[serde(rename = "pacienteId")]
    patient_id: i64,
    #[serde(rename = "data")]
    date: NaiveDate,
    #[serde(rename = "horaInicio")]
    start_time: NaiveTime,
    #[serde(rename = "horaFim")]
    end_time: NaiveTime,
    status: String,
    #[serde(rename = "criadoEm")]
    created_at: chrono::DateTime<chrono::Utc>,
}

impl AppointmentDto {
    fn into_model(self) -> Appointment {
        Appointment {
            id: self.id,
            dentist_id: self.dentist_id,
            patient_id: self.patient_id,
            date: self.date,
            start_time: self.start_time,
            end_time: self.end_time,
            status: parse_appointment_status(&self.status),
            procedure_type: None,
            created_at: self.created_at,
        }
    }
}

/// 后端状态词汇表到枚举的映射（采用界面使用的完整词汇表）
fn parse_appointment_status(raw: &str) -> AppointmentStatus {
    match raw {
        "AGENDADO" => AppointmentStatus::Scheduled,
        "CONFIRMADO" => AppointmentStatus::Confirmed,
        "CONCLUIDO" => AppointmentStatus::Completed,
        "FALTOU" => AppointmentStatus::NoShow,
        "REMARCADO" => AppointmentStatus::Rescheduled,
        "CANCELADO" => AppointmentStatus::Cancelled,
        other => {
            warn!("Unknown appointment status from backend: {}", other);
            AppointmentStatus::Scheduled
        }
    }
}

fn procedure_code(procedure: ProcedureType) -> &'static str {
    match procedure {
        ProcedureType::Consultation => "CONSULTA",
        ProcedureType::Cleaning => "LIMPEZA",
        ProcedureType::Extraction => "EXTRACAO",
        ProcedureType::Filling => "RESTAURACAO",
        ProcedureType::RootCanal => "CANAL",
        ProcedureType::Prosthesis => "PROTESE",
        ProcedureType::Orthodontics => "ORTODONTIA",
        ProcedureType::Implant => "IMPLANTE",
        ProcedureType::Whitening => "CLAREAMENTO",
        ProcedureType::Emergency => "EMERGENCIA",
        ProcedureType::Evaluation => "AVALIACAO",
        ProcedureType::FollowUp => "RETORNO",
        ProcedureType::Other => "OUTRO",
    }
}

/// 诊所后端调度连接器
///
/// 同时实现可用性检查与预约服务两个协作接口
pub struct HttpSchedulingConnector {
    config: SchedulingConnectorConfig,
    client: reqwest::Client,
}

impl HttpSchedulingConnector {
    pub fn new(config: SchedulingConnectorConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ClinicError::Config(format!("failed to build http client: {}", e)))?;

        info!(
            "Scheduling connector {} targeting {}",
            config.name, config.endpoint
        );
        Ok(Self { config, client })
    }

    /// 探测后端健康状态
    pub async fn check_connection(&self) -> Result<bool> {
        let url = format!("{}/health", self.config.endpoint);
        let request = self.with_auth(self.client.get(&url));

        match request.send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(e) => {
                warn!("Health check failed for {}: {}", self.config.name, e);
                Ok(false)
            }
        }
    }

    /// 添加认证头
    fn with_auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.authentication {
            AuthConfig::None => request,
            AuthConfig::BasicAuth { username, password } => {
                request.basic_auth(username, Some(password))
            }
            AuthConfig::ApiKey { key, header } => {
                let header_name = header.as_deref().unwrap_or("X-API-Key");
                request.header(header_name, key)
            }
            AuthConfig::BearerToken { token } => request.bearer_auth(token),
        }
    }
}

#[async_trait]
impl AvailabilityCheck for HttpSchedulingConnector {
    async fn check_available(
        &self,
        dentist_id: i64,
        date: NaiveDate,
        start_time: NaiveTime,
        end_time: NaiveTime,
    ) -> Result<bool> {
        let url = format!("{}/agenda/disponibilidade", self.config.endpoint);
        debug!(
            "Checking availability for dentist {} on {} {}-{}",
            dentist_id, date, start_time, end_time
        );

        let request = self.with_auth(self.client.get(&url).query(&[
            ("dentistaId", dentist_id.to_string()),
            ("data", date.to_string()),
            ("horaInicio", start_time.format("%H:%M").to_string()),
            ("horaFim", end_time.format("%H:%M").to_string()),
        ]));

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ClinicError::UnknownOutcome(format!("availability check timed out: {}", e))
            } else {
                ClinicError::Network(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            return Err(ClinicError::Network(format!(
                "availability check returned {}",
                response.status()
            )));
        }

        let body: AvailabilityResponse = response
            .json()
            .await
            .map_err(|e| ClinicError::Network(e.to_string()))?;
        Ok(body.disponivel)
    }
}

#[async_trait]
impl AppointmentService for HttpSchedulingConnector {
    async fn create_appointment(&self, request: &NewAppointment) -> Result<i64> {
        let url = format!("{}/agendamentos", self.config.endpoint);
        let payload = serde_json::json!({
            "dentistaId": request.dentist_id,
            "pacienteId": request.patient_id,
            "data": request.date,
            "horaInicio": request.start_time.format("%H:%M").to_string(),
            "horaFim": request.end_time.format("%H:%M").to_string(),
            "tipoProcedimento": request.procedure_type.map(procedure_code),
        });

        let http_request = self.with_auth(self.client.post(&url).json(&payload));

        let response = http_request.send().await.map_err(|e| {
            // 请求可能已到达后端：超时或发送后断连都属于结果未知
            if e.is_timeout() || (e.is_request() && !e.is_connect()) {
                ClinicError::UnknownOutcome(format!("appointment creation outcome unknown: {}", e))
            } else {
                ClinicError::AppointmentCreationFailed(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            return Err(ClinicError::AppointmentCreationFailed(format!(
                "backend returned {}",
                response.status()
            )));
        }

        // 2xx 表示后端已经落库；应答体解码失败不等于创建失败，
        // 按结果未知处理，调用方必须先对账再考虑重试
        let created: CreatedAppointmentResponse = response.json().await.map_err(|e| {
            ClinicError::UnknownOutcome(format!(
                "appointment creation returned success but body was undecodable: {}",
                e
            ))
        })?;

        info!("Created appointment {} via {}", created.id, self.config.name);
        Ok(created.id)
    }

    async fn cancel_appointment(&self, appointment_id: i64) -> Result<()> {
        let url = format!("{}/agendamentos/{}", self.config.endpoint, appointment_id);
        let request = self.with_auth(self.client.delete(&url));

        let response = request
            .send()
            .await
            .map_err(|e| ClinicError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ClinicError::Network(format!(
                "cancel of appointment {} returned {}",
                appointment_id,
                response.status()
            )));
        }

        info!("Cancelled appointment {} via {}", appointment_id, self.config.name);
        Ok(())
    }

    async fn find_appointment(
        &self,
        dentist_id: i64,
        date: NaiveDate,
        start_time: NaiveTime,
    ) -> Result<Option<Appointment>> {
        let url = format!("{}/agendamentos", self.config.endpoint);
        let request = self.with_auth(self.client.get(&url).query(&[
            ("dentistaId", dentist_id.to_string()),
            ("data", date.to_string()),
            ("horaInicio", start_time.format("%H:%M").to_string()),
        ]));

        let response = request
            .send()
            .await
            .map_err(|e| ClinicError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ClinicError::Network(format!(
                "appointment lookup returned {}",
                response.status()
            )));
        }

        let matches: Vec<AppointmentDto> = response
            .json()
            .await
            .map_err(|e| ClinicError::Network(e.to_string()))?;

        Ok(matches.into_iter().next().map(AppointmentDto::into_model))
    }
}
