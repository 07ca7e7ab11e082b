use std::fmt;
use std::path::PathBuf;

use clap::{Args, Parser, ValueEnum};

pub const TFT_ASSET_CODE: &str = "TFT";
pub const TFT_TESTNET_ISSUER: &str = "GA47YZA3PKFUZMPLQ3B5F2E3CJIB57TGGU7SPCQT2WAEYKN766PWIMB3";
pub const TFT_MAINNET_ISSUER: &str = "GBOVQKJYHXRR3DX6NOX2RRYFRCUMSADGDESTDNBDS6CDVLGVESRTAC47";

const TESTNET_PASSPHRASE: &str = "Test SDF Network ; September 2015";
const MAINNET_PASSPHRASE: &str = "Public Global Stellar Network ; September 2015";

const HORIZON_TESTNET_URL: &str = "https://horizon-testnet.stellar.org";
const HORIZON_MAINNET_URL: &str = "https://horizon.stellar.org";

#[derive(Debug, Clone, Parser)]
#[command(
    name = "tfchain-bridge",
    about = "Validator daemon for the two-way TFT bridge between TFChain and the Stellar network",
    version
)]
pub struct BridgeConfig {
    /// Tfchain websocket url, comma separated when more than one endpoint is
    /// available
    #[arg(long = "tfchainurl")]
    pub tfchain_url: String,

    /// Tfchain secret seed
    #[arg(long = "tfchainseed")]
    pub tfchain_seed: String,

    /// If provided, rescan the bridge stellar account and mint all
    /// transactions again
    #[arg(long = "rescan")]
    pub rescan_bridge_account: bool,

    /// File where the last seen blockheight and stellar account cursor are
    /// stored
    #[arg(long = "persistency", default_value = "./node.json")]
    pub persistency_file: PathBuf,

    #[command(flatten)]
    pub stellar: StellarConfig,

    /// Sets debug level log output
    #[arg(long = "debug")]
    pub debug: bool,
}

#[derive(Debug, Clone, Args)]
pub struct StellarConfig {
    /// Stellar bridge wallet address, shared by all validators
    #[arg(long = "bridgewallet")]
    pub stellar_bridge_account: String,

    /// Stellar network
    #[arg(long = "network", value_enum, default_value_t = StellarNetwork::Testnet)]
    pub stellar_network: StellarNetwork,

    /// Secret seed of this validator's stellar keypair
    #[arg(long = "secret")]
    pub stellar_seed: String,

    /// Stellar horizon url endpoint, overrides the network default
    #[arg(long = "horizon")]
    pub stellar_horizon_url: Option<String>,
}

impl StellarConfig {
    pub fn horizon_url(&self) -> String {
        self.stellar_horizon_url
            .clone()
            .unwrap_or_else(|| self.stellar_network.default_horizon_url().to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StellarNetwork {
    Testnet,
    Production,
}

impl StellarNetwork {
    /// TFT asset identity as `(code, issuer)`.
    pub fn tft_asset(self) -> (&'static str, &'static str) {
        match self {
            StellarNetwork::Testnet => (TFT_ASSET_CODE, TFT_TESTNET_ISSUER),
            StellarNetwork::Production => (TFT_ASSET_CODE, TFT_MAINNET_ISSUER),
        }
    }

    pub fn passphrase(self) -> &'static str {
        match self {
            StellarNetwork::Testnet => TESTNET_PASSPHRASE,
            StellarNetwork::Production => MAINNET_PASSPHRASE,
        }
    }

    pub fn default_horizon_url(self) -> &'static str {
        match self {
            StellarNetwork::Testnet => HORIZON_TESTNET_URL,
            StellarNetwork::Production => HORIZON_MAINNET_URL,
        }
    }
}

impl fmt::Display for StellarNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StellarNetwork::Testnet => write!(f, "testnet"),
            StellarNetwork::Production => write!(f, "production"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_the_full_flag_set() {
        let cfg = BridgeConfig::try_parse_from([
            "tfchain-bridge",
            "--tfchainurl",
            "wss://tfchain.grid.tf",
            "--tfchainseed",
            "//Alice",
            "--bridgewallet",
            "GBRIDGE",
            "--secret",
            "SSECRET",
            "--network",
            "production",
            "--persistency",
            "/tmp/node.json",
            "--rescan",
            "--debug",
        ])
        .unwrap();
        assert_eq!(cfg.tfchain_url, "wss://tfchain.grid.tf");
        assert!(cfg.rescan_bridge_account);
        assert!(cfg.debug);
        assert_eq!(cfg.stellar.stellar_network, StellarNetwork::Production);
        assert_eq!(cfg.persistency_file, PathBuf::from("/tmp/node.json"));
    }

    #[test]
    fn defaults_to_testnet_and_node_json() {
        let cfg = BridgeConfig::try_parse_from([
            "tfchain-bridge",
            "--tfchainurl",
            "wss://tfchain.grid.tf",
            "--tfchainseed",
            "//Alice",
            "--bridgewallet",
            "GBRIDGE",
            "--secret",
            "SSECRET",
        ])
        .unwrap();
        assert_eq!(cfg.stellar.stellar_network, StellarNetwork::Testnet);
        assert_eq!(cfg.persistency_file, PathBuf::from("./node.json"));
        assert!(!cfg.rescan_bridge_account);
        assert_eq!(
            cfg.stellar.horizon_url(),
            "https://horizon-testnet.stellar.org"
        );
    }

    #[test]
    fn horizon_override_wins() {
        let cfg = StellarConfig {
            stellar_bridge_account: "GBRIDGE".into(),
            stellar_network: StellarNetwork::Production,
            stellar_seed: "SSECRET".into(),
            stellar_horizon_url: Some("http://localhost:8000".into()),
        };
        assert_eq!(cfg.horizon_url(), "http://localhost:8000");
    }
}
