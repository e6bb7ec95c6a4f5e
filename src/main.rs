use clap::Parser;
use invoicer::cli::{
    Args, JwtSecrets, build_config, init_logging, load_jwt_secrets, open_database,
    validate_public_origin,
};
use invoicer::{init_cleanup, run_server};
use tracing::{error, info};
use url::Url;

fn main() {
    let args = Args::parse();

    init_logging(&args.log_format);

    // Secrets are removed from the environment, which must happen before the
    // runtime starts its worker threads.
    let secrets = load_jwt_secrets(
        args.jwt_secret_file.as_deref(),
        args.jwt_refresh_secret_file.as_deref(),
    )
    .unwrap_or_else(|e| {
        error!(error = %e, "Invalid signing secret configuration");
        std::process::exit(1);
    });

    let public_origin = validate_public_origin(&args.public_origin).unwrap_or_else(|e| {
        error!(error = %e, "Invalid public origin");
        std::process::exit(1);
    });

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap_or_else(|e| {
            error!(error = %e, "Failed to start async runtime");
            std::process::exit(1);
        });

    runtime.block_on(serve(args, secrets, public_origin));
}

async fn serve(args: Args, secrets: JwtSecrets, public_origin: Url) {
    let Some(db) = open_database(&args.database).await else {
        std::process::exit(1);
    };

    let config = build_config(&args, db, secrets, public_origin).unwrap_or_else(|e| {
        error!(error = %e, "Invalid configuration");
        std::process::exit(1);
    });

    init_cleanup(&config.db).await;

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            error!(address = %addr, error = %e, "Failed to bind");
            std::process::exit(1);
        });

    match listener.local_addr() {
        Ok(local_addr) => info!(address = %local_addr, "Listening"),
        Err(e) => error!(error = %e, "Failed to read local address"),
    }

    if let Err(e) = run_server(config, listener).await {
        error!(error = %e, "Server error");
        std::process::exit(1);
    }
}
