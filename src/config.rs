use crate::{
    language::Language,
    storage::{self, StorageManager},
};
use serde::{Deserialize, Serialize};

const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:7785";

/// Default Gemini API base.
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
/// Default generation model for annotation, intent parsing and synthesis.
const DEFAULT_GEN_MODEL: &str = "gemini-2.5-flash";
/// Default embedding model.
const DEFAULT_EMBED_MODEL: &str = "text-embedding-004";
/// Environment variable holding the API key. The key never lives in the file.
const DEFAULT_API_KEY_ENV: &str = "GEMINI_API_KEY";
/// Per-call timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// How many notes a recall answer may be grounded on.
const DEFAULT_TOP_K: usize = 10;

/// Configuration for the remote model provider.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InferenceConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Generation model (annotation, intent parsing, synthesis).
    #[serde(default = "default_gen_model")]
    pub model: String,

    #[serde(default = "default_embed_model")]
    pub embed_model: String,

    /// Name of the environment variable the API key is read from.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_GEN_MODEL.to_string(),
            embed_model: DEFAULT_EMBED_MODEL.to_string(),
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_gen_model() -> String {
    DEFAULT_GEN_MODEL.to_string()
}

fn default_embed_model() -> String {
    DEFAULT_EMBED_MODEL.to_string()
}

fn default_api_key_env() -> String {
    DEFAULT_API_KEY_ENV.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

/// Configuration for the recall pipeline.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RecallConfig {
    /// Maximum notes handed to answer synthesis.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RecallConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
        }
    }
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Default display language for annotations and answers.
    #[serde(default)]
    pub language: Language,

    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    #[serde(default)]
    pub inference: InferenceConfig,

    #[serde(default)]
    pub recall: RecallConfig,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: String,
}

fn default_listen_addr() -> String {
    DEFAULT_LISTEN_ADDR.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            language: Language::default(),
            listen_addr: default_listen_addr(),
            inference: InferenceConfig::default(),
            recall: RecallConfig::default(),
            base_path: String::new(),
        }
    }
}

impl Config {
    fn validate(&mut self) {
        if self.recall.top_k == 0 {
            panic!("recall.top_k must be greater than 0");
        }

        if self.inference.timeout_secs == 0 {
            panic!("inference.timeout_secs must be greater than 0");
        }

        if self.inference.base_url.is_empty()
            || self.inference.model.is_empty()
            || self.inference.embed_model.is_empty()
        {
            panic!("inference.base_url, inference.model and inference.embed_model must be set");
        }

        if self.listen_addr.parse::<std::net::SocketAddr>().is_err() {
            panic!("listen_addr {:?} is not a valid socket address", self.listen_addr);
        }
    }

    pub fn load_with(base_path: &str) -> Self {
        let store = storage::BackendLocal::new(base_path).expect("could not open base directory");

        // create new if does not exist
        if !store.exists("config.yaml") {
            store
                .write(
                    "config.yaml",
                    serde_yml::to_string(&Self::default()).unwrap().as_bytes(),
                )
                .expect("could not write default config");
        }

        let config_str = String::from_utf8(store.read("config.yaml").expect("config unreadable"))
            .expect("config file is not valid utf8");
        let mut config: Self = serde_yml::from_str(&config_str).expect("config is malformed");

        config.base_path = base_path.to_string();

        config.validate();

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config).unwrap() {
            config.save();
        }

        config
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// Re-anchor a deserialized config (whose `base_path` is never on the
    /// wire) to an on-disk location.
    pub fn with_base_path(mut self, base_path: &str) -> Self {
        self.base_path = base_path.to_string();
        self
    }

    pub fn save(&self) {
        let store =
            storage::BackendLocal::new(&self.base_path).expect("could not open base directory");

        let config_str = serde_yml::to_string(&self).unwrap();
        store
            .write("config.yaml", config_str.as_bytes())
            .expect("could not write config");
    }
}
