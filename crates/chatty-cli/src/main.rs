use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use zeroize::Zeroizing;

use chatty_client::{
    ChatClient, ClientConfig, DecryptedMessage, HttpRelay, PushChannel, RealtimeSync, SyncUpdate,
};
use chatty_proto::{ChatId, OutboundMessage, UserId};

const DEFAULT_LOG_FILTER: &str = "chatty_client=info,chatty_cli=info";

#[derive(Parser, Debug)]
#[command(author, version, about = "Chatty end-to-end encrypted group chat", long_about = None)]
struct Cli {
    /// Relay base URL (overrides CHATTY_SERVER_URL)
    #[arg(long, global = true)]
    server: Option<String>,
    /// Account name (or CHATTY_USERNAME)
    #[arg(long, short, global = true)]
    user: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create an account and its identity key
    Signup {
        #[arg(long)]
        email: Option<String>,
    },
    /// Show the logged-in account and its key fingerprint
    Whoami,
    /// List chats and whether their key could be opened
    Chats,
    /// Create a chat
    Create { name: String },
    /// Give another user access to a chat
    Invite { chat_id: ChatId, username: String },
    /// Print the decrypted history of a chat
    History { chat_id: ChatId },
    /// Send one message
    Send {
        chat_id: ChatId,
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
    /// List the members of a chat
    Participants { chat_id: ChatId },
    /// Find users by name
    Search { query: String },
    /// Remove a member from a chat you own
    Remove { chat_id: ChatId, user_id: UserId },
    /// Leave a chat
    Leave { chat_id: ChatId },
    /// Delete a chat you own
    Delete { chat_id: ChatId },
    /// Open a chat, print live messages and send each line typed on stdin
    Listen { chat_id: ChatId },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = ClientConfig::from_env();
    if let Some(server) = cli.server {
        config.server_url = server;
    }
    let username = match cli.user.or_else(|| std::env::var("CHATTY_USERNAME").ok()) {
        Some(u) if !u.trim().is_empty() => u.trim().to_string(),
        _ => return Err(anyhow!("no account given; pass --user or set CHATTY_USERNAME")),
    };

    let relay = HttpRelay::new(&config)?;
    let client = ChatClient::new(relay, config);

    let command = match cli.command {
        Commands::Signup { email } => {
            let password = prompt_password_twice("Choose password: ")?;
            let public = client.signup(&username, email.as_deref(), &password).await?;
            println!("Account {username} created.");
            println!("Key fingerprint: {}", public.fingerprint());
            return Ok(());
        }
        other => other,
    };

    let password = prompt_password_once("Password: ")?;
    let profile = client.login(&username, &password).await?;
    drop(password);
    client.load_chats().await?;

    match command {
        Commands::Signup { .. } => {}
        Commands::Whoami => {
            println!("{} (id {})", profile.username, profile.id);
            println!("Key fingerprint: {}", profile.fingerprint);
        }
        Commands::Chats => {
            for chat in client.chats().await {
                let lock = if client.has_key(chat.id).await { "" } else { "  [key unavailable]" };
                let owner = if chat.owner_id == profile.id { " (owner)" } else { "" };
                println!("{:>6}  {}{owner}{lock}", chat.id, chat.name);
            }
        }
        Commands::Create { name } => {
            let chat = client.create_chat(&name).await?;
            println!("Created chat {} ({})", chat.id, chat.name);
        }
        Commands::Invite { chat_id, username } => {
            client.invite_user(chat_id, &username).await?;
            println!("Invited {username} to chat {chat_id}");
        }
        Commands::History { chat_id } => {
            for msg in client.history(chat_id).await? {
                print_message(&msg);
            }
        }
        Commands::Send { chat_id, text } => {
            let msg = client.compose(chat_id, &text.join(" ")).await?;
            send_once(client.relay(), client.config(), &msg).await?;
        }
        Commands::Participants { chat_id } => {
            for user in client.participants(chat_id).await? {
                let key = if user.public_key.is_empty() { "  [no key]" } else { "" };
                println!("{:>6}  {}{key}", user.id, user.username);
            }
        }
        Commands::Search { query } => {
            for user in client.search_users(&query).await? {
                println!("{:>6}  {}", user.id, user.username);
            }
        }
        Commands::Remove { chat_id, user_id } => {
            client.remove_participant(chat_id, user_id).await?;
            println!("Removed user {user_id} from chat {chat_id}");
        }
        Commands::Leave { chat_id } => {
            client.leave_chat(chat_id).await?;
            println!("Left chat {chat_id}");
        }
        Commands::Delete { chat_id } => {
            client.delete_chat(chat_id).await?;
            println!("Deleted chat {chat_id}");
        }
        Commands::Listen { chat_id } => listen(client, chat_id).await?,
    }
    Ok(())
}

async fn send_once(relay: &HttpRelay, config: &ClientConfig, msg: &OutboundMessage) -> Result<()> {
    let channel = relay.push_channel(config)?;
    let mut conn = channel.connect().await.context("connecting push channel")?;
    conn.send_frame(serde_json::to_string(msg)?).await?;
    info!("[cli] message sent to chat {}", msg.chat_id);
    Ok(())
}

async fn listen(client: ChatClient<HttpRelay>, chat_id: ChatId) -> Result<()> {
    let ticket = client.select_chat(chat_id).await?;
    if let Some(history) = client.load_messages(ticket).await? {
        for msg in &history {
            print_message(msg);
        }
    }

    let channel = client.relay().push_channel(client.config())?;
    let (out_tx, out_rx) = mpsc::channel::<OutboundMessage>(32);
    let (up_tx, mut up_rx) = mpsc::channel::<SyncUpdate>(32);
    let sync = tokio::spawn(RealtimeSync::new(client.clone(), channel).run(out_rx, up_tx));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            update = up_rx.recv() => match update {
                Some(update) => {
                    if !render_update(update, chat_id) {
                        break;
                    }
                }
                None => break,
            },
            line = lines.next_line() => match line? {
                Some(line) if line.trim().is_empty() => {}
                Some(line) => {
                    let msg = client.compose(chat_id, line.trim()).await?;
                    out_tx.send(msg).await.map_err(|_| anyhow!("sync loop stopped"))?;
                }
                None => break,
            },
        }
    }

    drop(up_rx);
    sync.await?;
    Ok(())
}

/// Returns false once the listened-to chat is gone.
fn render_update(update: SyncUpdate, chat_id: ChatId) -> bool {
    match update {
        SyncUpdate::Connected => eprintln!("-- connected"),
        SyncUpdate::Disconnected => eprintln!("-- connection lost, reconnecting"),
        SyncUpdate::ChatsRefreshed(chats) => eprintln!("-- chat list updated ({} chats)", chats.len()),
        SyncUpdate::ChatRemoved(id) if id != chat_id => eprintln!("-- chat {id} was deleted"),
        SyncUpdate::ChatRemoved(_) => {}
        SyncUpdate::OpenChatClosed(id) => {
            eprintln!("-- chat {id} was deleted");
            return false;
        }
        SyncUpdate::ParticipantsChanged { participants, .. } => {
            let names: Vec<_> = participants.iter().map(|u| u.username.as_str()).collect();
            eprintln!("-- members: {}", names.join(", "));
        }
        SyncUpdate::Message(msg) => print_message(&msg),
    }
    true
}

fn print_message(msg: &DecryptedMessage) {
    let who = if msg.is_mine { "you" } else { msg.username.as_str() };
    println!("[{}] {who}: {}", msg.created_at.format("%Y-%m-%d %H:%M"), msg.body);
}

fn prompt_password_once(prompt: &str) -> Result<Zeroizing<String>> {
    if let Ok(pw) = std::env::var("CHATTY_PASSWORD") {
        if !pw.is_empty() {
            return Ok(Zeroizing::new(pw));
        }
    }
    let pw = rpassword::prompt_password(prompt).map_err(|e| anyhow!("password prompt: {e}"))?;
    Ok(Zeroizing::new(pw))
}

fn prompt_password_twice(prompt: &str) -> Result<Zeroizing<String>> {
    if let Ok(pw) = std::env::var("CHATTY_PASSWORD") {
        if !pw.is_empty() {
            return Ok(Zeroizing::new(pw));
        }
    }
    let first = prompt_password_once(prompt)?;
    if first.len() < 8 {
        return Err(anyhow!("password too short; minimum 8 characters"));
    }
    let second = Zeroizing::new(
        rpassword::prompt_password("Confirm password: ").map_err(|e| anyhow!("password prompt: {e}"))?,
    );
    if first != second {
        return Err(anyhow!("passwords do not match"));
    }
    Ok(first)
}
