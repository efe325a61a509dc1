//! Interactive session over stdin/stdout
//!
//! | Input | Effect |
//! |-------|--------|
//! | `/clear` | drop conversation history |
//! | `/tools` | list available operations |
//! | `/quit` | exit |
//! | anything else | one agent turn |

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::error;

use fluxion_chat::Agent;

/// How questions are answered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Operation dispatch with the text-to-SQL fallback
    Tools,
    /// Token streaming without operation dispatch
    Stream,
    /// Every question goes through text-to-SQL
    DirectSql,
}

pub async fn answer_once(agent: &mut Agent, mode: Mode, question: &str) -> Result<()> {
    let mut stdout = tokio::io::stdout();
    answer(agent, mode, question, &mut stdout).await
}

async fn answer(
    agent: &mut Agent,
    mode: Mode,
    question: &str,
    stdout: &mut tokio::io::Stdout,
) -> Result<()> {
    match mode {
        Mode::Tools => {
            let reply = agent.process_message(question).await?;
            stdout.write_all(reply.as_bytes()).await?;
        }
        Mode::DirectSql => {
            let reply = agent.process_direct_query(question).await;
            stdout.write_all(reply.as_bytes()).await?;
        }
        Mode::Stream => {
            let mut stream = agent.stream_response(question).await?;
            while let Some(chunk) = stream.next_chunk().await {
                stdout.write_all(chunk?.as_bytes()).await?;
                stdout.flush().await?;
            }
        }
    }
    stdout.write_all(b"\n").await?;
    stdout.flush().await?;
    Ok(())
}

pub async fn run(agent: &mut Agent, mode: Mode) -> Result<()> {
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    stdout
        .write_all(b"fluxion ready. /tools lists operations, /clear resets, /quit exits.\n")
        .await?;

    loop {
        stdout.write_all(b"\n> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();

        match input {
            "" => continue,
            "/quit" | "/exit" => break,
            "/clear" => {
                agent.clear_history();
                stdout.write_all(b"Conversation history cleared\n").await?;
            }
            "/tools" => {
                for name in agent.available_tools().await {
                    stdout.write_all(format!("  {}\n", name).as_bytes()).await?;
                }
            }
            question => {
                // A failed turn should not end the session.
                if let Err(e) = answer(agent, mode, question, &mut stdout).await {
                    error!("Turn failed: {:#}", e);
                    stdout
                        .write_all(format!("Error processing message: {:#}\n", e).as_bytes())
                        .await?;
                }
            }
        }
    }
    Ok(())
}
