//! npc-chat: talk to a character from the terminal

use npc_chat::llm::{
    warn_if_missing, CredentialSource, EnvCredentials, LoggingService, OpenAIService,
};
use npc_chat::{ChatConfig, ChatController, ChatEvent, CharacterStore, InMemoryCharacterStore};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str = "usage: npc-chat <character.json> [player-name]";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr so the conversation on stdout stays readable
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "npc_chat=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let Some(definition_path) = args.next() else {
        eprintln!("{USAGE}");
        std::process::exit(2);
    };
    let player = args.next().unwrap_or_else(|| "Player".to_string());

    let config = ChatConfig::from_env();
    let credentials: Arc<dyn CredentialSource> = Arc::new(EnvCredentials::default());
    warn_if_missing(credentials.as_ref());

    let service = OpenAIService::new(
        config.model.clone(),
        credentials,
        config.endpoint.clone(),
        config.request_timeout,
    )?;
    let llm = LoggingService::new(Arc::new(service));

    let store = Arc::new(InMemoryCharacterStore::new());
    let character_id = store.load_definition(Path::new(&definition_path)).await?;
    let character = store.get(&character_id).await?;

    tracing::info!(
        model = %config.model,
        classify_topics = config.classify_topics,
        max_attempts = ?config.retry.max_attempts,
        "Chat configured"
    );

    let chat = ChatController::new(llm, store.clone(), config);
    if chat.config().check_connection_on_start {
        // Reported through the log; the chat does not wait for it
        drop(chat.spawn_connection_check());
    }

    let mut events = chat.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(ChatEvent::Reply(reply)) => println!("{}: {}", reply.character_name, reply.reply),
                Ok(ChatEvent::Failed { message, .. }) => eprintln!("(no reply: {message})"),
                Ok(ChatEvent::StateChange { .. }) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            }
        }
    });

    let description = if character.description.is_empty() {
        String::new()
    } else {
        format!("{} ", character.description)
    };
    chat.start_new_chat_with(&player, &character_id, &description)
        .await?;
    println!("Talking to {}. Commands: /end, /resume, /quit", character.name);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let result = match line.trim() {
            "" => continue,
            "/quit" => break,
            "/end" => chat.end_current_chat().await,
            "/resume" => chat.return_to_chat(&player, &character_id).await,
            text => chat.request_chat_response(text).await,
        };
        if let Err(e) = result {
            eprintln!("{e}");
        }
    }

    chat.end_current_chat().await?;
    Ok(())
}
