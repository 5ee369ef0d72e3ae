pub mod commands;

use std::future::Future;

use lexdoc_core::{AuthContext, Config, Settings};

/// Install the fmt subscriber with `RUST_LOG` plus default directives.
pub fn init_logging(directives: &[&str]) {
    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    for directive in directives {
        match directive.parse() {
            Ok(directive) => filter = filter.add_directive(directive),
            Err(e) => eprintln!("Ignoring log directive '{}': {}", directive, e),
        }
    }
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Shared inputs of every command.
pub struct Context {
    pub config: Config,
    pub settings: Settings,
    pub auth: AuthContext,
}

impl Context {
    pub fn load(token: Option<String>) -> anyhow::Result<Self> {
        let config = Config::load_or_default();
        config.ensure_dirs()?;
        let settings = Settings::load(&config.settings_file).with_env_overrides();
        tracing::debug!(settings_file = ?config.settings_file, "Settings loaded");

        Ok(Self {
            config,
            settings,
            auth: AuthContext::with_token(token),
        })
    }
}

/// Run a command on a fresh runtime, exiting non-zero on failure.
pub fn run<F, Fut>(token: Option<String>, command: F)
where
    F: FnOnce(Context) -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!(error = %e, "Failed to create tokio runtime");
            std::process::exit(1);
        }
    };

    let result = rt.block_on(async {
        let ctx = Context::load(token)?;
        command(ctx).await
    });

    if let Err(e) = result {
        tracing::error!("{:#}", e);
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}
