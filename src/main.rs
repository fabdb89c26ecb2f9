use std::process::ExitCode;
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use clap::{Parser, Subcommand, ValueEnum};
use dotenvy::dotenv;
use serde::Serialize;
use uuid::Uuid;

use dispatch_chat::chat::{ChatService, ChatSettings, Collaborators, ReadSide, authenticate};
use dispatch_chat::collaborators::{
    LocalObjectStorage, LogPush, ObjectStorage, PushNotifier, TokenAuthenticator, WebhookPush,
};
use dispatch_chat::common::{
    Clock, DeliveryStatus, OrderSummary, Profile, Requester, SystemClock, local_part,
};
use dispatch_chat::config::{self, AppConfig};
use dispatch_chat::error::{ChatError, ChatResult};
use dispatch_chat::storage::{self, DirectoryDatabase, MessageDatabase};

#[derive(Parser)]
#[command(
    name = "dispatch-chat",
    version,
    about = "Courier chat between customers and the dispatcher"
)]
struct Cli {
    /// Path to JSON config file
    #[arg(long, default_value = config::DEFAULT_CONFIG_PATH, value_name = "FILE")]
    config: String,
    /// Bearer token of the caller
    #[arg(long, env = "DISPATCH_TOKEN", value_name = "TOKEN")]
    token: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Send a message (customers always write to the dispatcher)
    Send {
        #[arg(long)]
        to: Option<String>,
        #[arg(long, default_value = "")]
        text: String,
        /// Image URL or base64 payload
        #[arg(long, conflicts_with = "image_file")]
        image: Option<String>,
        /// Local image file to upload
        #[arg(long, value_name = "PATH")]
        image_file: Option<String>,
    },
    /// Fetch a conversation, oldest first
    Fetch {
        #[arg(long)]
        with: Option<String>,
    },
    /// Mark everything a counterpart sent you as read
    MarkRead {
        counterpart: String,
        #[arg(long, value_enum)]
        side: Side,
    },
    /// Acknowledge a single message
    Ack {
        id: String,
        #[arg(long, default_value = "read")]
        status: DeliveryStatus,
    },
    /// Dispatcher inbox
    Threads,
    /// Record a new order and log it in the chat
    OrderPlaced {
        #[arg(long)]
        description: String,
        #[arg(long, default_value = "")]
        pickup: String,
        #[arg(long, default_value = "")]
        delivery: String,
        #[arg(long, default_value = "")]
        receiver_name: String,
        #[arg(long, default_value = "")]
        weight: String,
        /// Local package photo to upload
        #[arg(long, value_name = "PATH")]
        image_file: Option<String>,
    },
    /// Set the caller's display name and avatar
    ProfileSet {
        #[arg(long)]
        name: String,
        #[arg(long)]
        avatar: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Side {
    Dispatcher,
    Customer,
}

impl From<Side> for ReadSide {
    fn from(side: Side) -> Self {
        match side {
            Side::Dispatcher => ReadSide::Dispatcher,
            Side::Customer => ReadSide::Customer,
        }
    }
}

struct App {
    service: ChatService,
    directory: Arc<DirectoryDatabase>,
    storage: Arc<LocalObjectStorage>,
    clock: Arc<dyn Clock>,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();
    let mut app_config = config::load_config(&cli.config);
    app_config.apply_env_overrides();

    match run(cli, app_config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{err}");
            match serde_json::to_string_pretty(&err) {
                Ok(json) => eprintln!("{json}"),
                Err(_) => eprintln!("{err}"),
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, app_config: AppConfig) -> ChatResult<()> {
    let credential = cli
        .token
        .ok_or_else(|| ChatError::Unauthorized("no token given (--token or DISPATCH_TOKEN)".into()))?;
    let auth = TokenAuthenticator::new(app_config.tokens.clone());
    let requester = authenticate(&auth, &credential).await?;
    log::debug!("Authenticated {} as {:?}", requester.identity, requester.role);

    let app = build_app(&app_config)?;

    match cli.command {
        Command::Send {
            to,
            text,
            image,
            image_file,
        } => {
            let image = match image_file {
                Some(path) => Some(read_image(&path).await?),
                None => image,
            };
            let message = app
                .service
                .send_message(&requester, to.as_deref(), &text, image.as_deref())
                .await?;
            print_json(&message)
        }
        Command::Fetch { with } => {
            let views = app
                .service
                .fetch_conversation(&requester, with.as_deref())
                .await?;
            print_json(&views)
        }
        Command::MarkRead { counterpart, side } => {
            let changed = app
                .service
                .mark_read(&requester, &counterpart, side.into())
                .await?;
            print_json(&serde_json::json!({ "updated": changed }))
        }
        Command::Ack { id, status } => {
            let changed = app.service.acknowledge(&requester, &id, status).await?;
            print_json(&serde_json::json!({ "updated": changed }))
        }
        Command::Threads => {
            let threads = app.service.list_threads(&requester).await?;
            print_json(&threads)
        }
        Command::OrderPlaced {
            description,
            pickup,
            delivery,
            receiver_name,
            weight,
            image_file,
        } => {
            let attachment_key = match image_file {
                Some(path) => upload_package_photo(&app, &requester, &path).await?,
                None => None,
            };
            let order = OrderSummary {
                id: Uuid::new_v4().to_string(),
                identity: requester.identity.clone(),
                description,
                status: "Pending".to_string(),
                attachment_key,
                pickup_location: pickup,
                delivery_location: delivery,
                receiver_name,
                weight,
                created_at: app.clock.now(),
            };
            let logged = app.service.record_order_placed(&requester, &order).await?;
            app.directory.insert_order(&order)?;
            print_json(&serde_json::json!({ "order": order, "messages": logged }))
        }
        Command::ProfileSet { name, avatar } => {
            let profile = Profile {
                identity: requester.identity.clone(),
                display_name: name,
                avatar_key: avatar,
            };
            app.directory.upsert_profile(&profile)?;
            print_json(&profile)
        }
    }
}

fn build_app(app_config: &AppConfig) -> ChatResult<App> {
    storage::ensure_data_dir(&app_config.database_path)?;
    storage::ensure_data_dir(&app_config.directory_path)?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = Arc::new(MessageDatabase::with_path(&app_config.database_path)?);
    let directory = Arc::new(DirectoryDatabase::with_path(&app_config.directory_path)?);

    if app_config.signing_secret.is_empty() {
        log::warn!("No signing secret configured; attachment links are signed with an empty key");
    }
    let object_storage = Arc::new(LocalObjectStorage::new(
        &app_config.storage_root,
        &app_config.public_base_url,
        app_config.signing_secret.as_bytes(),
        app_config.url_ttl()?,
        clock.clone(),
    ));

    let push: Arc<dyn PushNotifier> = match (&app_config.push_app_id, &app_config.push_api_key) {
        (Some(app_id), Some(api_key)) => Arc::new(WebhookPush::new(
            &app_config.push_endpoint,
            Some(app_id.clone()),
            Some(api_key.clone()),
        )),
        _ => {
            log::info!("Push gateway not configured; notifications go to the log");
            Arc::new(LogPush)
        }
    };

    let mut settings = ChatSettings::new(&app_config.dispatcher_identity);
    settings.brand_name = app_config.brand_name.clone();
    settings.presence_window = app_config.presence_window()?;
    settings.conversation_limit = app_config.conversation_limit;

    let service = ChatService::new(
        store,
        Collaborators {
            storage: object_storage.clone(),
            profiles: directory.clone(),
            orders: directory.clone(),
            push,
        },
        clock.clone(),
        settings,
    );

    Ok(App {
        service,
        directory,
        storage: object_storage,
        clock,
    })
}

async fn read_image(path: &str) -> ChatResult<String> {
    let bytes = tokio::fs::read(path).await?;
    Ok(format!("data:image/jpeg;base64,{}", STANDARD.encode(bytes)))
}

async fn upload_package_photo(
    app: &App,
    requester: &Requester,
    path: &str,
) -> ChatResult<Option<String>> {
    let raw = read_image(path).await?;
    let folder = format!("packages_{}", local_part(&requester.identity));
    match app.storage.store(&raw, &folder).await {
        Ok(key) if !key.is_empty() => Ok(Some(key)),
        Ok(_) => Ok(None),
        Err(err) => {
            log::warn!("Package photo upload failed: {err}");
            Ok(None)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> ChatResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
