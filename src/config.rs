//! Configuração do TRAMITA carregada a partir de `tramita.toml`.
//!
//! A struct [`TramitaConfig`] contém todos os parâmetros configuráveis.
//! Valores não presentes no arquivo usam defaults sensíveis.
//! A variável de ambiente `TRAMITA_DATA_DIR` tem precedência sobre o arquivo.

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::directory::StaticDirectory;
use crate::state_machine::PermitStatus;

/// Nome do arquivo de snapshot dentro de `data_dir`.
pub const SNAPSHOT_FILE: &str = "state.json";

/// Configuração de nível superior carregada de `tramita.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct TramitaConfig {
    /// Diretório onde o snapshot `state.json` é gravado.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Raiz do armazenamento de arquivos. Padrão: `<data_dir>/files`.
    #[serde(default)]
    pub storage_dir: Option<PathBuf>,

    /// Prefixo das URLs públicas. Vazio gera URLs `file://`.
    #[serde(default)]
    pub public_base_url: String,

    /// Filtro do `tracing` quando `RUST_LOG` não está definido.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,

    /// Estado inicial de uma permissão recém-vinculada.
    #[serde(default = "default_initial_status")]
    pub default_initial_status: String,

    /// Tabelas de consulta para embarques, clientes e entidades.
    #[serde(default)]
    pub directory: StaticDirectory,
}

// Valor padrão para o diretório de dados: ".tramita".
fn default_data_dir() -> PathBuf {
    PathBuf::from(".tramita")
}

// Valor padrão para o filtro de log: "info".
fn default_log_filter() -> String {
    "info".to_string()
}

// Valor padrão para o estado inicial: "PENDING".
fn default_initial_status() -> String {
    PermitStatus::Pending.as_str().to_string()
}

impl Default for TramitaConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            storage_dir: None,
            public_base_url: String::new(),
            log_filter: default_log_filter(),
            default_initial_status: default_initial_status(),
            directory: StaticDirectory::default(),
        }
    }
}

impl TramitaConfig {
    /// Carrega a configuração de `tramita.toml` no diretório atual.
    /// Usa valores padrão se o arquivo não existir.
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new("tramita.toml"))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("lendo {}", path.display()))?;
            toml::from_str::<TramitaConfig>(&contents)
                .with_context(|| format!("interpretando {}", path.display()))?
        } else {
            Self::default()
        };

        // Variável de ambiente tem precedência sobre o arquivo de configuração.
        if let Ok(dir) = std::env::var("TRAMITA_DATA_DIR")
            && !dir.is_empty()
        {
            config.data_dir = PathBuf::from(dir);
        }

        Ok(config)
    }

    pub fn storage_root(&self) -> PathBuf {
        self.storage_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("files"))
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.data_dir.join(SNAPSHOT_FILE)
    }

    /// Estado inicial já validado contra o enum fechado de estados.
    pub fn initial_status(&self) -> Result<PermitStatus> {
        self.default_initial_status
            .parse::<PermitStatus>()
            .map_err(|e| anyhow!("default_initial_status inválido: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = TramitaConfig::default();
        assert_eq!(config.data_dir, PathBuf::from(".tramita"));
        assert_eq!(config.storage_root(), PathBuf::from(".tramita/files"));
        assert_eq!(config.snapshot_path(), PathBuf::from(".tramita/state.json"));
        assert_eq!(config.log_filter, "info");
        assert_eq!(config.initial_status().unwrap(), PermitStatus::Pending);
        assert!(config.public_base_url.is_empty());
    }

    #[test]
    fn deserialize_partial_toml() {
        let toml_str = r#"
            storage_dir = "/srv/tramita"
            default_initial_status = "sd"

            [directory.clients]
            "CL-3" = "Importadora Sur"
        "#;
        let config: TramitaConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.storage_root(), PathBuf::from("/srv/tramita"));
        assert_eq!(config.initial_status().unwrap(), PermitStatus::Sd);
        assert_eq!(
            config.directory.clients.get("CL-3").map(String::as_str),
            Some("Importadora Sur")
        );
        assert_eq!(config.data_dir, PathBuf::from(".tramita"));
    }

    #[test]
    fn unknown_initial_status_is_rejected() {
        let config = TramitaConfig {
            default_initial_status: "APPROVED".into(),
            ..TramitaConfig::default()
        };
        assert!(config.initial_status().is_err());
    }

    #[test]
    fn load_from_reads_the_given_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tramita.toml");
        std::fs::write(&path, "log_filter = \"tramita=debug\"\n").unwrap();
        let config = TramitaConfig::load_from(&path).unwrap();
        assert_eq!(config.log_filter, "tramita=debug");
    }

    #[test]
    fn load_falls_back_to_defaults() {
        // Arquivo inexistente: todos os valores padrão.
        let dir = tempfile::tempdir().unwrap();
        let config = TramitaConfig::load_from(&dir.path().join("ausente.toml")).unwrap();
        assert_eq!(config.log_filter, "info");
    }
}
