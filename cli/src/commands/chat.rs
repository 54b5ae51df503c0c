use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use calmline_core::AnswerPipeline;

use super::ask::local_pipeline;

const GREETING: &str = "💙 Calmline: coping support for anxiety and panic. Educational information only. Type 'exit' to leave.\n";
const PROMPT: &str = "\n> ";

pub async fn run() -> i32 {
    let pipeline = local_pipeline().await;
    let stdin = BufReader::new(tokio::io::stdin());
    match chat_loop(&pipeline, stdin, tokio::io::stdout()).await {
        Ok(_) => 0,
        Err(e) => {
            tracing::error!(error = %e, "chat session aborted");
            1
        }
    }
}

/// One reply per non-blank input line until `exit`/`quit` or end of input.
/// Lines reach the pipeline verbatim. Returns how many questions were answered.
pub async fn chat_loop<R, W>(
    pipeline: &AnswerPipeline,
    input: R,
    mut output: W,
) -> std::io::Result<usize>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    let mut answered = 0;

    output.write_all(GREETING.as_bytes()).await?;
    loop {
        output.write_all(PROMPT.as_bytes()).await?;
        output.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let command = line.trim();
        if command.is_empty() {
            continue;
        }
        if command.eq_ignore_ascii_case("exit") || command.eq_ignore_ascii_case("quit") {
            break;
        }

        let result = pipeline.answer_question(&line).await;
        output.write_all(result.reply.as_bytes()).await?;
        output.write_all(b"\n").await?;
        answered += 1;
    }
    output.flush().await?;
    Ok(answered)
}
