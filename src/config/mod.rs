use serde::Deserialize;

/// Immutable configuration for all three processes, read from the
/// environment once at startup. A value that fails to parse aborts startup.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Orchestrator bind address. Ignored by the worker and idle detector.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string for the job registry
    pub database_url: String,

    /// Registry table name
    #[serde(default = "default_registry_table")]
    pub registry_table: String,

    /// Redis connection string for the work queue
    pub queue_url: String,

    /// Key namespace for the queue's ready/in-flight/dead-letter lists
    #[serde(default = "default_queue_name")]
    pub queue_name: String,

    /// Base URL of the compute-host control plane
    pub host_control_url: String,

    /// Identifier of the GPU host started on submit and stopped on idle
    pub host_id: String,

    /// Base URL of the inference engine on the GPU host
    #[serde(default = "default_engine_url")]
    pub engine_url: String,

    /// Seconds a received message stays invisible before redelivery
    #[serde(default = "default_visibility_timeout")]
    pub visibility_timeout: u64,

    /// Long-poll wait on queue receive, seconds
    #[serde(default = "default_receive_wait")]
    pub receive_wait: u64,

    /// Engine status poll interval, seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,

    /// Worker-side deadline per job, seconds
    #[serde(default = "default_job_deadline")]
    pub job_deadline: u64,

    /// Deliveries before a message is diverted to the dead-letter list
    #[serde(default = "default_max_receives")]
    pub max_receives: u32,

    /// Queue-depth sample interval for the idle detector, seconds
    #[serde(default = "default_idle_sample")]
    pub idle_sample: u64,

    /// Consecutive idle samples required before the host is stopped
    #[serde(default = "default_idle_periods")]
    pub idle_periods: u32,

    /// Queue depth at or below which a sample counts as idle
    #[serde(default = "default_idle_threshold")]
    pub idle_threshold: u64,

    /// Seconds a terminal record is kept before TTL reaping
    #[serde(default = "default_record_ttl")]
    pub record_ttl: u64,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_registry_table() -> String {
    "jobs".to_string()
}

fn default_queue_name() -> String {
    "gpu_jobs".to_string()
}

fn default_engine_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_visibility_timeout() -> u64 {
    300
}

fn default_receive_wait() -> u64 {
    20
}

fn default_poll_interval() -> u64 {
    2
}

fn default_job_deadline() -> u64 {
    600
}

fn default_max_receives() -> u32 {
    3
}

fn default_idle_sample() -> u64 {
    300
}

fn default_idle_periods() -> u32 {
    6
}

fn default_idle_threshold() -> u64 {
    0
}

fn default_record_ttl() -> u64 {
    604_800
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_env() -> Vec<(String, String)> {
        vec![
            ("DATABASE_URL".into(), "postgres://localhost/dispatch".into()),
            ("QUEUE_URL".into(), "redis://localhost:6379".into()),
            ("HOST_CONTROL_URL".into(), "http://control.local".into()),
            ("HOST_ID".into(), "gpu-host-1".into()),
        ]
    }

    #[test]
    fn defaults_match_documented_values() {
        let config: AppConfig = envy::from_iter(base_env()).unwrap();
        assert_eq!(config.visibility_timeout, 300);
        assert_eq!(config.receive_wait, 20);
        assert_eq!(config.poll_interval, 2);
        assert_eq!(config.job_deadline, 600);
        assert_eq!(config.max_receives, 3);
        assert_eq!(config.idle_sample, 300);
        assert_eq!(config.idle_periods, 6);
        assert_eq!(config.idle_threshold, 0);
        assert_eq!(config.registry_table, "jobs");
        assert_eq!(config.engine_url, "http://localhost:8000");
    }

    #[test]
    fn overrides_are_applied() {
        let mut env = base_env();
        env.push(("VISIBILITY_TIMEOUT".into(), "60".into()));
        env.push(("IDLE_PERIODS".into(), "2".into()));
        let config: AppConfig = envy::from_iter(env).unwrap();
        assert_eq!(config.visibility_timeout, 60);
        assert_eq!(config.idle_periods, 2);
    }

    #[test]
    fn missing_required_key_is_an_error() {
        let env = vec![("DATABASE_URL".to_string(), "postgres://x".to_string())];
        assert!(envy::from_iter::<_, AppConfig>(env).is_err());
    }

    #[test]
    fn unparseable_value_is_an_error() {
        let mut env = base_env();
        env.push(("MAX_RECEIVES".into(), "many".into()));
        assert!(envy::from_iter::<_, AppConfig>(env).is_err());
    }
}
