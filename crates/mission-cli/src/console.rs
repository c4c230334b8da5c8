use anyhow::Result;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Line-based prompt over any async reader/writer pair.
pub struct Console<R, W> {
    input: R,
    output: W,
}

impl<R, W> Console<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Shows `prompt` and waits for one line. `None` means input is exhausted.
    ///
    /// A line that is not valid UTF-8 is reported on the spot and answered as
    /// an empty line, so the caller's usual empty-input handling takes over.
    pub async fn ask(&mut self, prompt: &str) -> Result<Option<String>> {
        self.output.write_all(prompt.as_bytes()).await?;
        self.output.flush().await?;

        let mut raw = Vec::new();
        if self.input.read_until(b'\n', &mut raw).await? == 0 {
            return Ok(None);
        }

        let mut line = match String::from_utf8(raw) {
            Ok(line) => line,
            Err(e) => {
                debug!(error = %e, "Rejected non-UTF-8 input line");
                self.say("Invalid input: not valid UTF-8.").await?;
                return Ok(Some(String::new()));
            }
        };

        let trimmed = line.trim_end_matches(['\r', '\n']).len();
        line.truncate(trimmed);
        Ok(Some(line))
    }

    pub async fn say(&mut self, line: &str) -> Result<()> {
        self.output.write_all(line.as_bytes()).await?;
        self.output.write_all(b"\n").await?;
        self.output.flush().await?;
        Ok(())
    }

    pub fn into_output(self) -> W {
        self.output
    }
}
