//! CLI argument parsing.

use std::path::PathBuf;

use argh::FromArgs;

#[derive(Clone, Debug, FromArgs)]
#[argh(description = "Bitcoin chain tip tracker")]
pub(crate) struct Args {
    #[argh(option, short = 'c', description = "path to configuration")]
    pub(crate) config: PathBuf,

    /// Bitcoind RPC url that will override the one in the config toml.
    #[argh(option, description = "bitcoind rpc url")]
    pub(crate) rpc_url: Option<String>,

    /// Other generic overrides to the config toml.
    /// Will be used, for example, as `-o btcio.reader.client_poll_dur_ms=1000`
    #[argh(option, short = 'o', description = "generic config overrides")]
    pub(crate) overrides: Vec<String>,
}

impl Args {
    /// Get strings of overrides gathered from user and internal attributes.
    pub(crate) fn get_all_overrides(&self) -> Vec<String> {
        let mut overrides = self.overrides.clone();
        overrides.extend(self.get_internal_overrides());
        overrides
    }

    /// Overrides passed directly as args attributes.
    fn get_internal_overrides(&self) -> Vec<String> {
        let mut overrides = Vec::new();
        if let Some(rpc_url) = &self.rpc_url {
            overrides.push(format!("bitcoind.rpc_url=\"{rpc_url}\""));
        }
        overrides
    }
}
