use std::sync::OnceLock;

use serde::Deserialize;

fn default_deadlock_timeout() -> f64 {
    600.0
}

fn default_backend() -> String {
    "local".to_owned()
}

fn default_eager_size() -> usize {
    4096
}

fn default_inproc_pes() -> usize {
    1
}

#[derive(Deserialize, Debug)]
pub struct Config {
    /// A general timeout in seconds after which a progress loop that has not completed is reported as a potential deadlock, default: 600.0 seconds
    #[serde(default = "default_deadlock_timeout")]
    pub deadlock_timeout: f64,

    /// The lamellae backend to use
    /// local -- single pe execution, default
    /// inproc -- multi pe execution inside a single process
    #[serde(default = "default_backend")]
    pub backend: String, //local,inproc

    /// number of pes to create when the inproc backend is selected without an explicit fabric, default: 1
    #[serde(default = "default_inproc_pes")]
    pub inproc_pes: usize,

    /// serialized messages larger than this (in bytes) are sent through the data channel rather than inline, default: 4096
    #[serde(default = "default_eager_size")]
    pub eager_size: usize,

    /// include termination control messages in the debug trace output. Default: false
    #[serde(default)]
    pub print_term_msgs: bool,

    /// flag used to print warnings when a non-persistent anonymous callback is triggered more than once. Default: true
    pub callback_reuse_warning: Option<bool>,

    /// flag used to print warnings when a messenger is dropped with messages still buffered for unregistered handlers. Default: true
    pub pending_msgs_warning: Option<bool>,
}

/// Get the current Environment Variable configuration
pub fn config() -> &'static Config {
    static CONFIG: OnceLock<Config> = OnceLock::new();
    CONFIG.get_or_init(|| match envy::prefixed("AM_").from_env::<Config>() {
        Ok(config) => config,
        Err(error) => panic!("{}", error),
    })
}
