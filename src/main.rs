use std::sync::Arc;

use foodgram::{
    actions::{ingredients::import_ingredients, users::ensure_admin},
    assets::FsAssetStore,
    config::Config,
    cryptography::hash_password,
    jwt::SessionKey,
    postgres::PgStore,
    routes::{routes, AppState},
};

const MAX_CONNECTIONS: u32 = 5;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run().await {
        log::error!("{e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;

    let store = PgStore::connect(&config.database_url, MAX_CONNECTIONS).await?;
    store.init_schema().await?;

    if let Some(path) = &config.ingredients_file {
        import_ingredients(path, &store).await?;
    }

    if let Some(account) = &config.admin {
        ensure_admin(account, &store, hash_password).await?;
    }

    let state = AppState {
        store: Arc::new(store),
        assets: Arc::new(FsAssetStore::new(config.media_root.clone())),
        key: SessionKey::new(&config.jwt_secret, config.session_lifetime_hours),
        page_size: config.page_size,
        media_root: config.media_root.clone(),
    };

    log::info!("Listening on 0.0.0.0:{}", config.port);
    warp::serve(routes(state))
        .run(([0, 0, 0, 0], config.port))
        .await;

    Ok(())
}
