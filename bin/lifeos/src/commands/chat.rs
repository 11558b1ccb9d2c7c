use lifeos_orchestrator::{StreamFrame, TurnRequest};

use super::build_orchestrator;

/// One-shot local turn, streamed to stdout. Useful for smoke-testing the
/// pipeline without the HTTP gateway.
pub async fn run(
    message: String,
    session: Option<String>,
    agent: Option<String>,
    user: Option<String>,
) -> anyhow::Result<()> {
    let (_config, orchestrator) = build_orchestrator()?;

    let mut rx = orchestrator
        .handle_message_stream(TurnRequest {
            message,
            session_id: session,
            user_id: user,
            force_agent: agent,
        })
        .await?;

    use std::io::Write;
    let mut stdout = std::io::stdout();
    while let Some(frame) = rx.recv().await {
        match frame {
            StreamFrame::AgentSelected {
                session_id,
                agent,
                confidence,
            } => {
                eprintln!("[{} | confidence {:.2} | session {}]", agent, confidence, session_id);
            }
            StreamFrame::Chunk { content } => {
                print!("{}", content);
                stdout.flush()?;
            }
            StreamFrame::Done { .. } => {
                println!();
            }
            StreamFrame::Error {
                message,
                available_agents,
            } => {
                eprintln!("error: {}", message);
                if let Some(agents) = available_agents {
                    eprintln!("available agents: {}", agents.join(", "));
                }
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
