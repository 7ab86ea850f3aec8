//! Interactive client for the gateway

use colored::*;
use eyre::Result;
use std::io::{self, BufRead, Write};

use toolgate::ipc::{RpcClient, RpcResponse, methods};

/// Send one prompt and print the answer
pub async fn ask_once(client: &RpcClient, prompt: &str) -> Result<()> {
    let response = client.call(methods::GATEWAY_ASK, serde_json::json!({ "prompt": prompt })).await?;
    println!("{}", format_reply(&response));
    Ok(())
}

/// Read prompts from stdin until `quit`, `exit` or EOF
pub async fn run_interactive(client: &RpcClient) -> Result<()> {
    println!("{} {}", "Connected to gateway at".cyan(), client.address());
    println!("{}", "Type 'quit' or 'exit' to leave.".dimmed());

    let stdin = io::stdin();
    loop {
        print!("{} ", "You:".green().bold());
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            println!();
            break;
        }

        let prompt = line.trim();
        if prompt.is_empty() {
            continue;
        }
        if is_exit(prompt) {
            break;
        }

        // Transport problems end this prompt, not the session
        if let Err(e) = ask_once(client, prompt).await {
            println!("{} {}", "Error:".red().bold(), e);
        }
    }

    println!("{}", "Goodbye.".cyan());
    Ok(())
}

fn is_exit(prompt: &str) -> bool {
    matches!(prompt.to_lowercase().as_str(), "quit" | "exit")
}

/// Render a gateway.ask response for the terminal
pub fn format_reply(response: &RpcResponse) -> String {
    if let Some(error) = &response.error {
        let kind = error
            .data
            .as_ref()
            .and_then(|d| d["kind"].as_str())
            .unwrap_or("Error");
        return format!("{} [{}] {}", "Gateway error:".red().bold(), kind, error.message);
    }

    let result = response.result.clone().unwrap_or_default();
    let text = result["response"].as_str().unwrap_or("(empty response)");
    let mut out = format!("{} {}", "Gateway:".blue().bold(), text);

    if let Some(tool) = result.get("tool") {
        let name = tool["name"].as_str().unwrap_or("?");
        let line = match tool["status"].as_str() {
            Some("failure") => format!(
                "  tool {} failed ({}): {}",
                name,
                tool["kind"].as_str().unwrap_or("?"),
                tool["message"].as_str().unwrap_or("")
            )
            .yellow(),
            _ => format!("  tool {} succeeded", name).dimmed(),
        };
        out.push('\n');
        out.push_str(&line.to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use toolgate::ipc::{ErrorCode, RpcError};

    #[test]
    fn test_is_exit() {
        assert!(is_exit("quit"));
        assert!(is_exit("EXIT"));
        assert!(!is_exit("quitting time?"));
    }

    #[test]
    fn test_format_reply_success_with_tool() {
        colored::control::set_override(false);
        let response = RpcResponse::success(
            1,
            json!({
                "response": "264 days",
                "source": "rephrased",
                "tool": {"name": "calculate_date_difference", "status": "success"}
            }),
        );
        let text = format_reply(&response);
        assert!(text.contains("Gateway: 264 days"));
        assert!(text.contains("tool calculate_date_difference succeeded"));
    }

    #[test]
    fn test_format_reply_tool_failure() {
        colored::control::set_override(false);
        let response = RpcResponse::success(
            2,
            json!({
                "response": "Sorry",
                "tool": {
                    "name": "read_query",
                    "status": "failure",
                    "kind": "ProviderUnavailable",
                    "message": "connection refused"
                }
            }),
        );
        assert!(format_reply(&response).contains("read_query failed (ProviderUnavailable): connection refused"));
    }

    #[test]
    fn test_format_reply_error() {
        colored::control::set_override(false);
        let response = RpcResponse::error(
            3,
            RpcError::with_data(
                ErrorCode::TURN_FAILED,
                "Model unavailable: refused",
                json!({"kind": "ModelUnavailable"}),
            ),
        );
        assert_eq!(format_reply(&response), "Gateway error: [ModelUnavailable] Model unavailable: refused");
    }
}
