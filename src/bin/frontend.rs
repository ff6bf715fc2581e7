#[macro_use]
extern crate log;

#[tokio::main]
async fn main() -> Result<(), rocket::Error> {
    pretty_env_logger::init();

    let app = match docsign::setup() {
        Ok(app) => app,
        Err(err) => {
            error!("Unable to start: {}", err);
            std::process::exit(1);
        }
    };

    info!("docsign frontend starting...");

    app.rocket
        .attach(docsign::DbConn::fairing())
        .mount("/", docsign::views::routes())
        .register("/", docsign::views::catchers())
        .launch()
        .await?;
    Ok(())
}
