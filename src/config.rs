// src/config.rs

use serde::Deserialize;
use std::{env, fs, path::Path};

use crate::schema::Vocabulary;

pub const DEFAULT_CONFIG_PATH: &str = "config/receipts.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub vision: VisionConfig,
    pub vocabulary: VocabularyConfig,
    pub ledger: LedgerConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// Bearer token required on `/api/*`. Empty disables auth.
    pub auth_token: String,
    pub frontend_dir: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
            auth_token: String::new(),
            frontend_dir: Some("frontend".to_string()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    pub default_provider: String,
    pub timeout_secs: u64,
    pub claude: ProviderSection,
    pub gemini: ProviderSection,
    pub grok: ProviderSection,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            default_provider: "claude".to_string(),
            timeout_secs: 60,
            claude: ProviderSection::new(
                "https://api.anthropic.com/v1",
                "claude-haiku-4-5-20251001",
                "ANTHROPIC_API_KEY",
            ),
            gemini: ProviderSection::new(
                "https://generativelanguage.googleapis.com/v1beta",
                "gemini-2.0-flash",
                "GOOGLE_API_KEY",
            ),
            grok: ProviderSection::new(
                "https://api.x.ai/v1",
                "grok-2-vision-latest",
                "XAI_API_KEY",
            ),
        }
    }
}

/// Endpoint settings for one vision service.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSection {
    pub base_url: String,
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_max_tokens() -> u32 {
    512
}

impl ProviderSection {
    fn new(base_url: &str, model: &str, api_key_env: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            model: model.to_string(),
            api_key_env: api_key_env.to_string(),
            max_tokens: default_max_tokens(),
        }
    }

    pub fn api_key(&self) -> Result<String, String> {
        env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| format!("{} env var is not set", self.api_key_env))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VocabularyConfig {
    pub categories: Vec<String>,
    pub payment_methods: Vec<String>,
    pub default_category: String,
    /// Named ranges in the ledger that override the static lists when readable.
    pub categories_range: Option<String>,
    pub payment_methods_range: Option<String>,
}

impl VocabularyConfig {
    pub fn to_vocabulary(&self) -> Vocabulary {
        Vocabulary {
            categories: self.categories.clone(),
            payment_methods: self.payment_methods.clone(),
            default_category: self.default_category.clone(),
        }
    }
}

impl Default for VocabularyConfig {
    fn default() -> Self {
        let owned = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        Self {
            categories: owned(&[
                "Храна",
                "Оборотни стоки",
                "Стоки за дома",
                "Забавления",
                "Козметика",
                "Гориво",
                "Дрехи и обувки",
                "Разходи квартира",
                "Балчик",
                "Варна",
                "Провадия",
                "Подаръци",
                "Техсол",
                "Абонаментни сметки",
                "Кредитни карти",
                "Здравни",
                "Лора",
                "Бебе",
                "Разни",
                "Разходи апартамент",
            ]),
            payment_methods: owned(&[
                "ВиртуаленPOS",
                "Cash",
                "Diners",
                "ePay",
                "PayPal",
                "RaiCard",
                "Revolut",
                "FIB 0889",
                "Ваучери за храна",
                "ОББ",
                "Bulbank 4416",
            ]),
            default_category: "Разни".to_string(),
            categories_range: None,
            payment_methods_range: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerBackend {
    #[default]
    Sqlite,
    Sheets,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub backend: LedgerBackend,
    pub db_path: String,
    pub sheets: SheetsConfig,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            backend: LedgerBackend::Sqlite,
            db_path: "ledger/expenses.db".to_string(),
            sheets: SheetsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SheetsConfig {
    pub spreadsheet_id: String,
    pub worksheet: String,
    pub service_account_file: String,
}

impl Default for SheetsConfig {
    fn default() -> Self {
        Self {
            spreadsheet_id: String::new(),
            worksheet: "Sheet1".to_string(),
            service_account_file: "service_account.json".to_string(),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Box<dyn std::error::Error>> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load from `RECEIPTS_CONFIG` (or the default path), falling back to
    /// built-in defaults when no file exists, then apply env overrides.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let path = env::var("RECEIPTS_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut cfg = if Path::new(&path).exists() {
            Self::load(&path)?
        } else {
            Self::default()
        };
        cfg.apply_env(|key| env::var(key).ok());
        Ok(cfg)
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(provider) = var("VISION_PROVIDER") {
            self.vision.default_provider = provider;
        }
        if let Some(token) = var("AUTH_TOKEN") {
            self.server.auth_token = token;
        }
        if let Some(id) = var("GOOGLE_SHEETS_ID") {
            self.ledger.sheets.spreadsheet_id = id;
        }
        if let Some(ws) = var("GOOGLE_SHEETS_WORKSHEET") {
            self.ledger.sheets.worksheet = ws;
        }
        if let Some(file) = var("GOOGLE_SERVICE_ACCOUNT_FILE") {
            self.ledger.sheets.service_account_file = file;
        }
    }
}
