mod auth;
mod config;
mod db;
mod errors;
mod mailer;
mod models;
mod otp;
mod permissions;
mod routes;
mod storage;

use crate::config::Config;
use crate::db::Db;
use crate::models::user::ROLE_ADMIN;
use crate::routes::{
    admin as admin_routes, auth as auth_routes, files as files_routes, health as health_routes,
    share as share_routes, users as users_routes,
};
use crate::storage::{FileStore, blobs::BlobStore, repo::SqliteFileRepo};
use actix_cors::Cors;
use actix_web::http::header;
use actix_web::middleware::Logger;
use actix_web::web::Data;
use actix_web::{App, HttpServer, web};
use env_logger::Env;
use std::sync::Arc;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // info by default, overridable via RUST_LOG
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let cfg = Config::from_env_config();

    let db = Db::connect_and_migrate(&cfg.database_path)
        .await
        .expect("database init failed");

    promote_bootstrap_admin(&db, &cfg).await;

    let mailer = mailer::from_config(&cfg).expect("mailer init failed");
    let mailer: Data<dyn mailer::Mailer> = Data::from(mailer);

    let file_store = Data::new(FileStore::new(
        Arc::new(SqliteFileRepo::new(db.clone())),
        BlobStore::new(&cfg.uploads_dir),
    ));

    log::info!("Starting server at {}", cfg.listen);
    let listen_addr = cfg.listen.clone();
    HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin_fn({
                let origins = cfg.allowed_origins.clone();
                move |origin, _| {
                    origin
                        .to_str()
                        .map(|o| origins.iter().any(|a| a == o))
                        .unwrap_or(false)
                }
            })
            .allowed_methods(vec!["GET", "POST", "PATCH", "PUT", "DELETE"])
            .allowed_headers(vec![header::AUTHORIZATION, header::ACCEPT, header::CONTENT_TYPE])
            .supports_credentials()
            .max_age(3600);

        App::new()
            .wrap(Logger::default())
            .wrap(cors)
            .app_data(Data::new(cfg.clone()))
            .app_data(Data::new(db.clone()))
            .app_data(mailer.clone())
            .app_data(file_store.clone())
            .service(
                web::scope("/api")
                    .service(
                        web::scope("/auth")
                            .route("/signup", web::post().to(auth_routes::signup))
                            .route("/verify", web::post().to(auth_routes::verify))
                            .route("/login", web::post().to(auth_routes::login)),
                    )
                    .service(
                        web::scope("/users")
                            .route("/me", web::get().to(users_routes::me))
                            .route("/me", web::patch().to(users_routes::update_me))
                            .route("/me/password", web::put().to(users_routes::change_password)),
                    )
                    .service(
                        web::scope("/files")
                            .route("", web::post().to(files_routes::upload_file))
                            .route("", web::get().to(files_routes::list_files))
                            .route("/{id}", web::get().to(files_routes::get_file))
                            .route("/{id}", web::delete().to(files_routes::delete_file))
                            .route("/{id}/download", web::get().to(files_routes::download_file))
                            .route("/{id}/share", web::post().to(files_routes::create_share_link)),
                    )
                    .service(
                        web::scope("/admin")
                            .route("/users", web::get().to(admin_routes::list_users))
                            .route("/users/{id}", web::delete().to(admin_routes::delete_user))
                            .route("/files", web::get().to(admin_routes::list_files))
                            .route("/files/{id}", web::delete().to(admin_routes::delete_file)),
                    )
                    .route("/health", web::get().to(health_routes::health_check)),
            )
            .route("/share/{link_id}", web::get().to(share_routes::resolve_share))
    })
    .bind(listen_addr)?
    .run()
    .await
}

/// Out-of-band role provisioning: the only way an account becomes admin.
async fn promote_bootstrap_admin(db: &Db, cfg: &Config) {
    let Some(email) = &cfg.admin_email else {
        return;
    };
    match sqlx::query("UPDATE users SET role = ? WHERE email = ? AND role != ?")
        .bind(ROLE_ADMIN)
        .bind(email)
        .bind(ROLE_ADMIN)
        .execute(&db.0)
        .await
    {
        Ok(res) if res.rows_affected() > 0 => log::info!("promoted {email} to admin"),
        Ok(_) => {}
        Err(e) => log::error!("admin bootstrap failed: {e:?}"),
    }
}
