//! soulshield 命令行
//!
//! # Usage
//!
//! ```bash
//! # 清洗HTML（参数或标准输入）
//! echo '<img src=x onerror=alert(1)><b>hi</b>' | soulshield sanitize
//!
//! # 格式化聊天消息
//! soulshield format 'line one
//! **bold**'
//!
//! # 加解密
//! soulshield encrypt --passphrase pw 'secret' > payload.json
//! soulshield decrypt --passphrase pw < payload.json
//!
//! # 交互式聊天
//! SOULSHIELD_API_KEY=... soulshield chat --username amy --password pw
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use soulshield::{
    escape_html, format_message, AuthOutcome, ChatApp, ChatEncryption, ConfigManager, EncryptedPayload,
    HostCapabilities, Sanitizer, TurnOutcome,
};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use url::Url;

/// SoulShield 客户端核心工具
#[derive(Parser, Debug)]
#[command(name = "soulshield")]
#[command(about = "Sanitize, format and encrypt chat content; talk to the SoulShield chat service")]
#[command(version)]
struct Args {
    /// 输出调试日志
    #[arg(short, long, global = true)]
    verbose: bool,

    /// 文档源（相对链接按此解析）
    #[arg(long, global = true)]
    origin: Option<String>,

    /// 聊天服务根地址
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// 聊天服务 x-api-key
    #[arg(long, global = true)]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 按白名单清洗HTML
    Sanitize { input: Option<String> },
    /// 转义为纯文本
    Escape { input: Option<String> },
    /// 格式化聊天消息（转义 + 轻量标记）
    Format { input: Option<String> },
    /// 口令加密，输出 JSON
    Encrypt {
        #[arg(long, env = "SOULSHIELD_PASSPHRASE")]
        passphrase: String,
        input: Option<String>,
    },
    /// 解密 encrypt 输出的 JSON
    Decrypt {
        #[arg(long, env = "SOULSHIELD_PASSPHRASE")]
        passphrase: String,
        input: Option<String>,
    },
    /// 交互式聊天（/new 新会话，/summaries 摘要，/history 加密历史，/quit 退出）
    Chat {
        #[arg(long)]
        username: String,
        #[arg(long, env = "SOULSHIELD_PASSWORD")]
        password: String,
        /// 先注册再登录
        #[arg(long)]
        register: bool,
        /// 模拟不支持 Trusted Types 的宿主
        #[arg(long)]
        legacy: bool,
    },
}

async fn read_input(input: Option<String>) -> Result<String> {
    match input {
        Some(text) => Ok(text),
        None => {
            let mut buf = String::new();
            tokio::io::stdin()
                .read_to_string(&mut buf)
                .await
                .context("读取标准输入失败")?;
            Ok(buf)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let mut builder = ConfigManager::custom();
    let env_config = ConfigManager::from_env().context("读取环境配置失败")?;
    builder = builder
        .document_origin(env_config.document_origin)
        .api_url(env_config.api_url)
        .api_key(env_config.api_key);
    if let Some(origin) = &args.origin {
        builder = builder.document_origin(Url::parse(origin).context("文档源不是合法URL")?);
    }
    if let Some(api_url) = args.api_url {
        builder = builder.api_url(api_url);
    }
    if let Some(api_key) = args.api_key {
        builder = builder.api_key(api_key);
    }
    let config = builder.build();

    match args.command {
        Command::Sanitize { input } => {
            let html = read_input(input).await?;
            println!("{}", Sanitizer::with_config(&config).sanitize(&html));
        }
        Command::Escape { input } => {
            println!("{}", escape_html(&read_input(input).await?));
        }
        Command::Format { input } => {
            println!("{}", format_message(&read_input(input).await?));
        }
        Command::Encrypt { passphrase, input } => {
            let text = read_input(input).await?;
            let payload = ChatEncryption::new().encrypt_message(&text, &passphrase)?;
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
        Command::Decrypt { passphrase, input } => {
            let json = read_input(input).await?;
            let payload: EncryptedPayload = serde_json::from_str(&json).context("加密数据格式错误")?;
            println!("{}", ChatEncryption::new().decrypt_message(&payload, &passphrase)?);
        }
        Command::Chat {
            username,
            password,
            register,
            legacy,
        } => {
            let capabilities = if legacy {
                HostCapabilities::legacy()
            } else {
                HostCapabilities::enforced()
            };
            run_chat(ChatApp::new(config, capabilities)?, &username, &password, register).await?;
        }
    }
    Ok(())
}

async fn run_chat(mut app: ChatApp, username: &str, password: &str, register: bool) -> Result<()> {
    if register {
        app.toggle_auth_mode();
        if app.authenticate(username, password).await? == AuthOutcome::Registered {
            eprintln!("Account created.");
        }
    }
    if app.authenticate(username, password).await? != AuthOutcome::LoggedIn {
        bail!("登录失败");
    }
    eprintln!("Signed in as {} (session {})", username, app.session().short_session_id());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "/quit" => break,
            "/new" => {
                app.new_session()?;
                eprintln!("New session {}", app.session().short_session_id());
            }
            "/summaries" => {
                let count = app.load_summaries().await?;
                eprintln!("{} summaries", count);
                println!("{}", app.summaries_html());
            }
            "/history" => {
                println!("{}", serde_json::to_string_pretty(&app.encrypted_history()?)?);
            }
            message => match app.send_message(message).await? {
                Some(TurnOutcome::SessionExpired) => bail!("登录已失效，请重新登录"),
                Some(_) => {
                    if let Some(last) = app.session().messages().last() {
                        println!("{}", last.content);
                    }
                }
                None => {}
            },
        }
    }
    Ok(())
}
