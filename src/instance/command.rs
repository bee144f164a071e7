//! Helper process command lines

use std::collections::HashMap;
use std::path::Path;

use crate::config::CompileContext;
use crate::models::{HysteriaBean, HysteriaTransport, Profile, ProfileBean};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelperCommand {
    pub argv: Vec<String>,
    pub env: HashMap<String, String>,
}

/// Build the command that runs `profile`'s helper against `config_path`.
pub fn helper_command(
    profile: &Profile,
    helper_path: &Path,
    config_path: &Path,
    ctx: &CompileContext,
) -> Option<HelperCommand> {
    let path = helper_path.display().to_string();
    let config = config_path.display().to_string();

    match &profile.bean {
        ProfileBean::Hysteria(bean) => {
            let mut env = HashMap::new();
            env.insert("HYSTERIA_DISABLE_UPDATE_CHECK".to_string(), "1".to_string());

            let mut argv = if bean.protocol_version == HysteriaBean::PROTOCOL_VERSION_1 {
                let level = if ctx.verbose() { "trace" } else { "warn" };
                vec![
                    path,
                    "--no-check".to_string(),
                    "--config".to_string(),
                    config,
                    "--log-level".to_string(),
                    level.to_string(),
                    "client".to_string(),
                ]
            } else {
                let level = if ctx.verbose() { "warn" } else { "error" };
                vec![
                    path,
                    "client".to_string(),
                    "--config".to_string(),
                    config,
                    "--log-level".to_string(),
                    level.to_string(),
                ]
            };

            // faketcp needs raw sockets
            if bean.protocol_version == HysteriaBean::PROTOCOL_VERSION_2
                && bean.transport == HysteriaTransport::FakeTcp
            {
                argv.splice(0..0, ["su".to_string(), "-c".to_string()]);
            }
            Some(HelperCommand { argv, env })
        }
        ProfileBean::Naive(_) => Some(HelperCommand {
            argv: vec![path, config],
            env: HashMap::new(),
        }),
        _ => None,
    }
}
