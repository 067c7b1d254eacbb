use std::env;
use std::io::{self, Write};
use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::{sleep, Duration};

use mcpchat::clients::claude::{ClaudeClient, Model};
use mcpchat::tool_protocols::McpGatewayClient;
use mcpchat::{SessionStore, ToolGateway, ToolOrchestrator};

// Run from the root folder of the repo as follows:
// ANTHROPIC_API_KEY=your-key MCP_SERVER_URL=http://localhost:8080/mcp cargo run --example interactive_chat
//
// Commands: /tools lists the server's tools, /clear forgets the conversation, /quit exits.

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    mcpchat::init_logger();

    let secret_key = env::var("ANTHROPIC_API_KEY")
        .expect("Please set the ANTHROPIC_API_KEY environment variable!");
    let mcp_url =
        env::var("MCP_SERVER_URL").unwrap_or_else(|_| "https://blockza.fastmcp.app/mcp".into());

    let client = ClaudeClient::new_with_model_enum(&secret_key, Model::ClaudeSonnet35);
    let orchestrator = ToolOrchestrator::new(Arc::new(client));
    let gateway = McpGatewayClient::new(&mcp_url);
    let sessions = SessionStore::new();
    let session_id = SessionStore::new_session_id();

    match gateway.connect().await {
        Ok(()) => println!("Connected to {}", mcp_url),
        Err(e) => println!("Running without tools: {}", e),
    }

    loop {
        print!("\nYou: ");
        io::stdout().flush()?;

        let mut line = String::new();
        if io::stdin().read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();

        match input {
            "" => continue,
            "/quit" => break,
            "/clear" => {
                sessions.clear(&session_id).await;
                println!("Conversation cleared.");
                continue;
            }
            "/tools" => {
                match gateway.list_tools().await {
                    Ok(tools) => {
                        for tool in tools {
                            println!("- {}: {}", tool.name, tool.description);
                        }
                    }
                    Err(e) => println!("Failed to get tools: {}", e),
                }
                continue;
            }
            _ => {}
        }

        let (tx, rx) = watch::channel(true);
        tokio::spawn(display_waiting_dots(rx, 3));

        let history = sessions.get(&session_id).await;
        let result = orchestrator.run(input, &history, &gateway).await;
        let _ = tx.send(false);

        match result {
            Ok(outcome) => {
                for call in &outcome.tool_calls {
                    println!("[tool] {} {}", call.name, call.arguments);
                }
                println!("\nAssistant:\n{}", outcome.response);
                sessions
                    .commit_turn(&session_id, input, &outcome.response)
                    .await;
            }
            Err(e) => println!("\nError: {}", e),
        }
    }

    gateway.disconnect().await;
    Ok(())
}

async fn display_waiting_dots(rx: watch::Receiver<bool>, num_dots: usize) {
    while *rx.borrow() {
        for _ in 0..num_dots {
            if !*rx.borrow() {
                break;
            }
            print!(".");
            let _ = io::stdout().flush();
            sleep(Duration::from_millis(500)).await;
        }
        print!("\r{}\r", " ".repeat(num_dots));
        let _ = io::stdout().flush();
    }
}
