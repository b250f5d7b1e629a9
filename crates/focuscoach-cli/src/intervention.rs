//! Terminal intervention surface.
//!
//! Prints the intervention to the terminal and treats the user pressing
//! Enter as closing it.  `open` returns immediately; the close callback
//! fires from a reader task that the returned guard aborts.

use std::io::{self, Write};
use std::sync::Arc;

use async_trait::async_trait;
use focuscoach_monitor::{
    Intervention, InterventionSurface, MonitorError, OnClose, Result, SurfaceGuard,
};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::Mutex;
use tracing::{debug, warn};

type Input = Box<dyn AsyncBufRead + Send + Unpin>;

pub struct TerminalSurface {
    input: Arc<Mutex<Input>>,
}

impl TerminalSurface {
    /// Read acknowledgements from the process's stdin.
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()))
    }

    pub fn new(input: impl AsyncBufRead + Send + Unpin + 'static) -> Self {
        Self {
            input: Arc::new(Mutex::new(Box::new(input))),
        }
    }
}

#[async_trait]
impl InterventionSurface for TerminalSurface {
    async fn open(&self, intervention: Intervention, on_close: OnClose) -> Result<SurfaceGuard> {
        {
            let mut stdout = io::stdout().lock();
            stdout
                .write_all(render(&intervention).as_bytes())
                .and_then(|()| stdout.flush())
                .map_err(|e| MonitorError::Intervention {
                    reason: format!("failed to write to terminal: {e}"),
                })?;
        }

        let input = Arc::clone(&self.input);
        let reader = tokio::spawn(async move {
            let mut line = String::new();
            match input.lock().await.read_line(&mut line).await {
                Ok(0) => debug!("terminal input closed, dismissing intervention"),
                Ok(_) => debug!("intervention dismissed"),
                Err(e) => warn!(error = %e, "failed to read acknowledgement, closing intervention"),
            }
            on_close();
        });

        Ok(SurfaceGuard::new(move || reader.abort()))
    }
}

fn render(intervention: &Intervention) -> String {
    let mut out = String::new();
    out.push_str("\n  ==============================================\n");
    out.push_str(&format!("  {}\n", intervention.message));
    out.push_str("  ----------------------------------------------\n");
    out.push_str(&format!("  Goal:     {}\n", intervention.objective));
    if !intervention.description.is_empty() {
        out.push_str(&format!("  Noticed:  {}\n", intervention.description));
    }
    out.push_str("  ==============================================\n");
    out.push_str("  Press Enter to get back to work.\n");
    out
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use tokio::io::AsyncWriteExt;
    use tokio::sync::oneshot;

    use super::*;

    fn sample() -> Intervention {
        Intervention {
            message: "Back to work.".into(),
            description: "Video site open".into(),
            objective: "Write chapter 3".into(),
        }
    }

    #[test]
    fn render_includes_goal_and_description() {
        let text = render(&sample());
        assert!(text.contains("Back to work."));
        assert!(text.contains("Goal:     Write chapter 3"));
        assert!(text.contains("Noticed:  Video site open"));
    }

    #[test]
    fn render_omits_empty_description() {
        let text = render(&Intervention {
            message: "Back to work.".into(),
            description: String::new(),
            objective: "Write".into(),
        });
        assert!(!text.contains("Noticed"));
    }

    #[tokio::test]
    async fn enter_closes_the_intervention() {
        let (mut keyboard, terminal) = tokio::io::duplex(64);
        let surface = TerminalSurface::new(BufReader::new(terminal));
        let (tx, rx) = oneshot::channel();

        let _guard = surface
            .open(
                sample(),
                Box::new(move || {
                    let _ = tx.send(());
                }),
            )
            .await
            .unwrap();
        keyboard.write_all(b"\n").await.unwrap();

        tokio::time::timeout(Duration::from_secs(2), rx)
            .await
            .expect("on_close was never called")
            .unwrap();
    }

    #[tokio::test]
    async fn dropped_guard_stops_reading_and_frees_the_terminal() {
        let (mut keyboard, terminal) = tokio::io::duplex(64);
        let surface = TerminalSurface::new(BufReader::new(terminal));

        let closed = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&closed);
        let guard = surface
            .open(sample(), Box::new(move || flag.store(true, Ordering::SeqCst)))
            .await
            .unwrap();
        drop(guard);
        tokio::task::yield_now().await;

        keyboard.write_all(b"\n").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!closed.load(Ordering::SeqCst));

        // The next intervention gets the input the aborted one never read.
        let (tx, rx) = oneshot::channel();
        let _guard = surface
            .open(
                sample(),
                Box::new(move || {
                    let _ = tx.send(());
                }),
            )
            .await
            .unwrap();
        tokio::time::timeout(Duration::from_secs(2), rx)
            .await
            .expect("second intervention never closed")
            .unwrap();
    }
}
