use futures::future::join_all;
use sentinel_alert::{AlertManager, TriggerRequest};
use sentinel_config::HealthCheckEndpoint;
use sentinel_core::{SentinelError, SharedClock};
use sentinel_timeseries::MetricStore;
use sentinel_types::{labels_from, EndpointHealth, Labels};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::probe::{Probe, ProbeError, ProbeRequest, ProbeResponse};

pub const RESPONSE_TIME_METRIC: &str = "health_check_response_time";
pub const STATUS_METRIC: &str = "health_check_status";
/// 健康检查告警使用的规则 id
pub const HEALTH_ALERT_RULE: &str = "health_check_failed";

/// 单次检查结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckOutcome {
    pub endpoint: String,
    pub healthy: bool,
    pub status_code: Option<u16>,
    pub latency_ms: Option<f64>,
    pub attempts: u32,
    pub error: Option<String>,
}

/// 健康检查器
pub struct HealthChecker {
    endpoints: Vec<HealthCheckEndpoint>,
    probe: Arc<dyn Probe>,
    store: Arc<MetricStore>,
    manager: Arc<AlertManager>,
    clock: SharedClock,
    status: RwLock<HashMap<String, EndpointHealth>>,
}

impl HealthChecker {
    pub fn new(
        endpoints: Vec<HealthCheckEndpoint>,
        probe: Arc<dyn Probe>,
        store: Arc<MetricStore>,
        manager: Arc<AlertManager>,
        clock: SharedClock,
    ) -> Self {
        let status = endpoints
            .iter()
            .map(|e| (e.name.clone(), EndpointHealth::new(&e.name, &e.target)))
            .collect();

        Self {
            endpoints,
            probe,
            store,
            manager,
            clock,
            status: RwLock::new(status),
        }
    }

    pub fn endpoints(&self) -> &[HealthCheckEndpoint] {
        &self.endpoints
    }

    pub fn endpoint(&self, name: &str) -> Option<&HealthCheckEndpoint> {
        self.endpoints.iter().find(|e| e.name == name)
    }

    /// 并发检查所有端点
    pub async fn run_once(&self) -> Vec<CheckOutcome> {
        join_all(self.endpoints.iter().map(|e| self.check(e))).await
    }

    /// 检查单个端点：探测、记录指标、根据状态变化触发或恢复告警
    pub async fn check(&self, endpoint: &HealthCheckEndpoint) -> CheckOutcome {
        let (response, attempts, failure) = self.probe_with_retries(endpoint).await;

        let labels = labels_from([("endpoint", endpoint.name.as_str())]);
        let outcome = match response {
            Some(response) => {
                let latency_ms = response.latency_ms();
                self.record(RESPONSE_TIME_METRIC, latency_ms, labels.clone()).await;

                let within_timeout = response.latency <= endpoint.timeout();
                let fast_enough = response.latency < endpoint.expected_response_time();
                let status_ok = response.status_code == endpoint.expected_status;
                let healthy = within_timeout && fast_enough && status_ok;

                let error = if healthy {
                    None
                } else if !status_ok {
                    Some(format!(
                        "unexpected status {} (expected {})",
                        response.status_code, endpoint.expected_status
                    ))
                } else {
                    Some(format!(
                        "response time {:.0}ms exceeds {}ms",
                        latency_ms, endpoint.expected_response_time_ms
                    ))
                };

                CheckOutcome {
                    endpoint: endpoint.name.clone(),
                    healthy,
                    status_code: Some(response.status_code),
                    latency_ms: Some(latency_ms),
                    attempts,
                    error,
                }
            }
            None => {
                let err = SentinelError::ProbeFailure {
                    endpoint: endpoint.name.clone(),
                    reason: failure
                        .map(|e| e.to_string())
                        .unwrap_or_else(|| "no response".to_string()),
                };
                warn!(endpoint = %endpoint.name, attempts, "{}", err);

                CheckOutcome {
                    endpoint: endpoint.name.clone(),
                    healthy: false,
                    status_code: None,
                    latency_ms: None,
                    attempts,
                    error: Some(err.to_string()),
                }
            }
        };

        let status_value = if outcome.healthy { 1.0 } else { 0.0 };
        self.record(STATUS_METRIC, status_value, labels).await;

        let previous = self.update_status(&outcome).await;
        self.handle_transition(endpoint, previous, &outcome).await;
        outcome
    }

    async fn probe_with_retries(
        &self,
        endpoint: &HealthCheckEndpoint,
    ) -> (Option<ProbeResponse>, u32, Option<ProbeError>) {
        let request = ProbeRequest::from_endpoint(endpoint);
        let mut last_error = None;
        let mut attempts = 0;

        for attempt in 0..=endpoint.retries {
            attempts = attempt + 1;
            let result = match tokio::time::timeout(endpoint.timeout(), self.probe.probe(&request)).await {
                Ok(result) => result,
                Err(_) => Err(ProbeError::Timeout(endpoint.timeout())),
            };

            match result {
                Ok(response) => return (Some(response), attempts, None),
                Err(e) => {
                    debug!(endpoint = %endpoint.name, attempt = attempts, error = %e, "Probe attempt failed");
                    last_error = Some(e);
                }
            }
        }

        (None, attempts, last_error)
    }

    async fn record(&self, metric: &str, value: f64, labels: Labels) {
        if let Err(e) = self.store.record(metric, value, labels).await {
            error!(metric = %metric, "Failed to record health sample: {}", e);
        }
    }

    /// 更新快照，返回本次之前的健康状态
    async fn update_status(&self, outcome: &CheckOutcome) -> Option<bool> {
        let now = self.clock.now();
        let mut status = self.status.write().await;
        let entry = status
            .entry(outcome.endpoint.clone())
            .or_insert_with(|| EndpointHealth::new(&outcome.endpoint, ""));

        let previous = entry.healthy;
        entry.healthy = Some(outcome.healthy);
        entry.last_check = Some(now);
        entry.last_latency_ms = outcome.latency_ms;
        entry.last_status_code = outcome.status_code;
        entry.last_error = outcome.error.clone();
        entry.total_checks += 1;
        if outcome.healthy {
            entry.consecutive_failures = 0;
        } else {
            entry.consecutive_failures += 1;
            entry.failed_checks += 1;
        }
        previous
    }

    async fn handle_transition(
        &self,
        endpoint: &HealthCheckEndpoint,
        previous: Option<bool>,
        outcome: &CheckOutcome,
    ) {
        match (previous, outcome.healthy) {
            (Some(true), false) => {
                let reason = outcome.error.clone().unwrap_or_default();
                warn!(endpoint = %endpoint.name, "Endpoint became unhealthy: {}", reason);

                let request = TriggerRequest {
                    key: endpoint.alert_key(),
                    rule_id: HEALTH_ALERT_RULE.to_string(),
                    metric: STATUS_METRIC.to_string(),
                    severity: endpoint.severity,
                    description: format!("Health check failed for {}: {}", endpoint.name, reason),
                    // 没有响应时按超时时长计
                    current_value: outcome.latency_ms.unwrap_or(endpoint.timeout_ms as f64),
                    threshold: endpoint.expected_response_time_ms as f64,
                    labels: labels_from([("endpoint", endpoint.name.as_str())]),
                    channels: endpoint.channels.clone(),
                };
                self.manager.trigger(request).await;
            }
            (Some(false), true) => {
                info!(endpoint = %endpoint.name, "Endpoint recovered");
                self.manager.resolve(&endpoint.alert_key()).await;
            }
            _ => {}
        }
    }

    /// 所有端点的健康快照（按配置顺序）
    pub async fn status(&self) -> Vec<EndpointHealth> {
        let status = self.status.read().await;
        self.endpoints
            .iter()
            .filter_map(|e| status.get(&e.name).cloned())
            .collect()
    }

    pub async fn endpoint_status(&self, name: &str) -> Option<EndpointHealth> {
        self.status.read().await.get(name).cloned()
    }
}
