use sheetkeeper::{database, rolls, sheets, stats, submission, Config, Data, Error};

use poise::serenity_prelude as serenity;

async fn event_handler(
    _ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    _data: &Data,
) -> Result<(), Error> {
    if let serenity::FullEvent::Ready { data_about_bot, .. } = event {
        tracing::info!("Logged in as {}", data_about_bot.user.name);
    }
    Ok(())
}

async fn on_error(error: poise::FrameworkError<'_, Data, Error>) {
    match error {
        poise::FrameworkError::Setup { error, .. } => panic!("Failed to start bot: {:?}", error),
        poise::FrameworkError::Command { error, ctx, .. } => {
            tracing::warn!("Error in command `{}`: {:?}", ctx.command().name, error,);
            let reply = poise::CreateReply::default()
                .content("🔥 Something went wrong, please try again later.")
                .ephemeral(true);
            if let Err(e) = ctx.send(reply).await {
                tracing::error!("Error while reporting command error: {:?}", e)
            }
        }
        error => {
            if let Err(e) = poise::builtins::on_error(error).await {
                tracing::error!("Error while handling error: {:?}", e)
            }
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();
    dotenvy::dotenv().ok();

    let token =
        std::env::var("DISCORD_TOKEN").expect("'DISCORD_TOKEN' environment variable not found");
    let database_url =
        std::env::var("DATABASE_URL").expect("'DATABASE_URL' environment variable not found");
    let config = Config::from_env().expect("Invalid configuration");

    let pool = sqlx::PgPool::connect(&database_url)
        .await
        .expect("Failed to connect to the database");
    database::migrate(&pool)
        .await
        .expect("Failed to migrate the database");

    let intents = serenity::GatewayIntents::non_privileged();

    let framework = poise::Framework::builder()
        .setup(move |ctx, _ready, framework| {
            Box::pin(async move {
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                Ok(Data {
                    config,
                    database: pool,
                    registry: stats::Registry::new(),
                    catalog: sheets::Catalog::builtin(),
                })
            })
        })
        .options(poise::FrameworkOptions {
            commands: vec![
                submission::commands::character(),
                submission::commands::list_menu(),
                stats::commands::stats(),
                rolls::commands::roll(),
            ],
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            on_error: |error| Box::pin(on_error(error)),
            ..Default::default()
        })
        .build();

    let mut client = serenity::Client::builder(token, intents)
        .framework(framework)
        .await
        .expect("Error creating client");

    if let Err(why) = client.start().await {
        tracing::error!("Client error: {why:?}");
    }
}
