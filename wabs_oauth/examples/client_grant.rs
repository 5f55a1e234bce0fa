use std::time::Duration;

use clap::Parser;
use wabs_oauth::{ClientConfig, ClientId, ClientSecret, TokenClient};

#[derive(Debug, Parser)]
struct Opts {
    /// The authority's OpenID Connect discovery document URL
    #[clap(short, long, env)]
    discovery_url: String,

    /// The client ID of the client
    #[clap(short, long, env)]
    client_id: ClientId,

    /// The client secret used to identify the client to the issuing authority
    #[clap(short = 's', long, env, hide_env_values = true)]
    client_secret: ClientSecret,

    /// Revoke the token once it has been obtained
    #[clap(short, long)]
    revoke: bool,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .pretty()
        .with_env_filter(tracing_subscriber::filter::EnvFilter::from_default_env())
        .init();

    let opts = Opts::parse();

    let config = ClientConfig::new(opts.discovery_url, opts.client_id, opts.client_secret)
        .with_request_timeout(Duration::from_secs(10));

    let client = TokenClient::new(config).await?;

    let document = client.discovery_document();
    tracing::info!(
        token_endpoint = document.token_endpoint(),
        revocation_endpoint = ?document.revocation_endpoint(),
        cache_expires_at = document.cache_expires_at().as_secs(),
        "loaded discovery document"
    );

    let token = client.client_grant_token().await?;
    tracing::info!(
        token = format_args!("{:#?}", token.access_token()),
        token_type = token.token_type(),
        scope = token.scope(),
        lifetime = token.expires_in().0,
        "obtained client token"
    );

    if opts.revoke {
        client.revoke_token(Some(token.access_token()), None).await?;
        tracing::info!("revoked client token");
    }

    client.close();
    Ok(())
}
