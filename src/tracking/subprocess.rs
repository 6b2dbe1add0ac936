//! Face mesh helper subprocess
//!
//! Runs the landmark model as a child process and talks to it over a line
//! protocol on stdin/stdout:
//!
//! 1. the helper prints `{"ready": true}` once its model is loaded;
//! 2. per frame we write a JSON header line
//!    `{"seq":S,"width":W,"height":H,"format":"bgr24","bytes":N}` followed by
//!    N raw bytes;
//! 3. the helper answers one line, `{"seq":S,"faces":[[[x,y,z],...],...]}`
//!    or `{"seq":S,"error":"..."}`.
//!
//! Replies carrying an older `seq` belong to a frame we stopped waiting for
//! and are skipped. A frame write that was cut short leaves the helper's
//! input misaligned, so the helper is restarted before the next frame.

use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use crate::camera::Frame;
use crate::config::DetectorConfig;
use crate::error::DetectorError;

use super::detector::{DetectorSettings, LandmarkDetector};
use super::landmarks::{Point3D, RawLandmarkSet};

/// Header line preceding each frame's pixel bytes
#[derive(Debug, Serialize)]
struct FrameHeader<'a> {
    seq: u64,
    width: u32,
    height: u32,
    format: &'a str,
    bytes: usize,
}

/// Startup handshake line
#[derive(Debug, Deserialize)]
struct ReadyLine {
    #[serde(default)]
    ready: bool,
    #[serde(default)]
    error: Option<String>,
}

/// One reply from the helper
#[derive(Debug, Clone, Deserialize)]
pub struct FaceMeshReply {
    /// Sequence number of the frame this answers
    #[serde(default)]
    pub seq: Option<u64>,
    /// Detected faces, primary face first
    #[serde(default)]
    pub faces: Vec<Vec<[f32; 3]>>,
    /// Set when the helper failed on this frame
    #[serde(default)]
    pub error: Option<String>,
}

impl FaceMeshReply {
    /// Parse a reply line
    pub fn parse(line: &str) -> Result<Self, DetectorError> {
        serde_json::from_str(line.trim())
            .map_err(|e| DetectorError::MalformedReply(format!("JSON parse error: {}", e)))
    }

    /// Landmarks of the primary face, if any
    pub fn into_primary_face(self) -> Result<Option<RawLandmarkSet>, DetectorError> {
        if let Some(message) = self.error {
            return Err(DetectorError::Helper(message));
        }

        match self.faces.into_iter().next() {
            Some(face) => {
                let points = face.into_iter().map(Point3D::from).collect();
                RawLandmarkSet::new(points).map(Some)
            }
            None => Ok(None),
        }
    }
}

/// Landmark detector backed by a face mesh helper process
pub struct FaceMeshProcess {
    config: DetectorConfig,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stdout: Option<BufReader<ChildStdout>>,
    /// Partial reply line; survives a cancelled read
    line: String,
    sequence: u64,
    /// Set while a frame is only partly written, or once the helper's
    /// output has closed
    needs_restart: bool,
    released: bool,
}

impl FaceMeshProcess {
    /// Launch the helper and wait (bounded) for its ready line.
    pub async fn spawn(config: &DetectorConfig) -> Result<Self, DetectorError> {
        let settings = DetectorSettings::from(config);

        let mut child = Command::new(&config.program)
            .args(&config.args)
            .args(["--max-faces", &settings.max_faces.to_string()])
            .args([
                "--min-detection-confidence",
                &settings.min_detection_confidence.to_string(),
            ])
            .args([
                "--min-tracking-confidence",
                &settings.min_tracking_confidence.to_string(),
            ])
            .kill_on_drop(true)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| DetectorError::Spawn(format!("'{}': {}", config.program, e)))?;

        tracing::info!(
            "Face mesh helper started (pid: {:?}, max_faces: {}, detection: {}, tracking: {})",
            child.id(),
            settings.max_faces,
            settings.min_detection_confidence,
            settings.min_tracking_confidence,
        );

        let stdin = child.stdin.take();
        let stdout = child.stdout.take().map(BufReader::new);

        let mut helper = Self {
            config: config.clone(),
            child: Some(child),
            stdin,
            stdout,
            line: String::new(),
            sequence: 0,
            needs_restart: false,
            released: false,
        };

        let limit = Duration::from_millis(config.ready_timeout_ms);
        let ready = match tokio::time::timeout(limit, helper.await_ready()).await {
            Ok(result) => result,
            Err(_) => Err(DetectorError::NotReady(format!(
                "no handshake within {} ms",
                config.ready_timeout_ms
            ))),
        };

        if let Err(e) = ready {
            helper.release();
            return Err(e);
        }

        Ok(helper)
    }

    async fn await_ready(&mut self) -> Result<(), DetectorError> {
        let line = self
            .next_line()
            .await
            .map_err(|e| DetectorError::NotReady(e.to_string()))?;

        let ready: ReadyLine = serde_json::from_str(line.trim())
            .map_err(|e| DetectorError::NotReady(format!("unexpected handshake: {}", e)))?;

        match (ready.ready, ready.error) {
            (true, _) => Ok(()),
            (false, Some(message)) => Err(DetectorError::NotReady(message)),
            (false, None) => Err(DetectorError::NotReady("helper reported not ready".to_string())),
        }
    }

    /// Next complete line from the helper. Cancel-safe: a partly read line
    /// stays buffered for the next call.
    async fn next_line(&mut self) -> Result<String, DetectorError> {
        let stdout = self.stdout.as_mut().ok_or(DetectorError::Released)?;

        let n = stdout
            .read_line(&mut self.line)
            .await
            .map_err(|e| DetectorError::Io(e.to_string()))?;
        if n == 0 {
            self.needs_restart = true;
            return Err(DetectorError::Io("helper closed its output".to_string()));
        }

        Ok(std::mem::take(&mut self.line))
    }

    async fn send_frame(&mut self, seq: u64, frame: &Frame) -> Result<(), DetectorError> {
        let stdin = self.stdin.as_mut().ok_or(DetectorError::Released)?;

        let header = FrameHeader {
            seq,
            width: frame.width,
            height: frame.height,
            format: "bgr24",
            bytes: frame.data.len(),
        };
        let mut header = serde_json::to_vec(&header)
            .map_err(|e| DetectorError::Io(format!("header encode: {}", e)))?;
        header.push(b'\n');

        self.needs_restart = true;
        let io = |e: std::io::Error| DetectorError::Io(e.to_string());
        stdin.write_all(&header).await.map_err(io)?;
        stdin.write_all(&frame.data).await.map_err(io)?;
        stdin.flush().await.map_err(io)?;
        self.needs_restart = false;

        Ok(())
    }

    /// Send one frame and wait for the reply that carries its sequence number
    async fn exchange(&mut self, frame: &Frame) -> Result<Option<RawLandmarkSet>, DetectorError> {
        self.sequence += 1;
        let seq = self.sequence;
        self.send_frame(seq, frame).await?;

        loop {
            let line = self.next_line().await?;
            let reply = FaceMeshReply::parse(&line)?;

            match reply.seq {
                Some(s) if s == seq => return reply.into_primary_face(),
                Some(s) if s < seq => {
                    tracing::debug!("Skipping stale face mesh reply for frame {}", s);
                }
                Some(s) => {
                    return Err(DetectorError::MalformedReply(format!(
                        "reply for frame {} while waiting on frame {}",
                        s, seq
                    )))
                }
                None => {
                    return match reply.error {
                        Some(message) => Err(DetectorError::Helper(message)),
                        None => Err(DetectorError::MalformedReply(
                            "reply without a frame sequence number".to_string(),
                        )),
                    }
                }
            }
        }
    }

    async fn restart(&mut self) -> Result<(), DetectorError> {
        tracing::warn!("Restarting face mesh helper");
        self.stop_child();
        *self = Self::spawn(&self.config).await?;
        Ok(())
    }

    fn stop_child(&mut self) {
        // Closing stdin lets a well-behaved helper exit on its own
        self.stdin = None;
        self.stdout = None;
        self.line.clear();

        if let Some(mut child) = self.child.take() {
            let pid = child.id();
            if let Err(e) = child.start_kill() {
                tracing::debug!("Face mesh helper already gone: {}", e);
            }
            tracing::info!("Face mesh helper stopped (pid: {:?})", pid);
        }
    }

    /// Whether the helper process is still alive
    pub fn is_running(&mut self) -> bool {
        match &mut self.child {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }
}

impl LandmarkDetector for FaceMeshProcess {
    fn process<'a>(
        &'a mut self,
        frame: &'a Frame,
    ) -> BoxFuture<'a, Result<Option<RawLandmarkSet>, DetectorError>> {
        async move {
            if self.released {
                return Err(DetectorError::Released);
            }
            if self.needs_restart {
                self.restart().await?;
            }

            let limit = self.config.reply_timeout_ms;
            match tokio::time::timeout(Duration::from_millis(limit), self.exchange(frame)).await {
                Ok(result) => result,
                Err(_) => Err(DetectorError::Timeout(limit)),
            }
        }
        .boxed()
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.stop_child();
    }
}

impl Drop for FaceMeshProcess {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::landmarks::topology;

    fn mesh_json(count: usize) -> serde_json::Value {
        let face: Vec<[f32; 3]> = (0..count).map(|i| [i as f32 / 1000.0, 0.5, 0.0]).collect();
        serde_json::json!({ "faces": [face] })
    }

    /// `sh -c <script> face-mesh <extra...>`; the detector flags follow `extra` in `$@`
    #[cfg(unix)]
    fn sh_helper(script: &str, extra: &[&str]) -> DetectorConfig {
        let mut args = vec!["-c".to_string(), script.to_string(), "face-mesh".to_string()];
        args.extend(extra.iter().map(|a| a.to_string()));
        DetectorConfig {
            program: "sh".to_string(),
            args,
            ..DetectorConfig::default()
        }
    }

    /// Handshake, then per frame: parse the header, consume exactly `bytes`
    /// raw bytes, count the frame in `$n` and run `reply`.
    #[cfg(unix)]
    fn frame_loop(reply: &str) -> String {
        [
            r#"echo '{"ready": true}'"#,
            "n=0",
            "while IFS= read -r header; do",
            r#"  seq=$(printf '%s' "$header" | sed 's/.*"seq":\([0-9]*\).*/\1/')"#,
            r#"  width=$(printf '%s' "$header" | sed 's/.*"width":\([0-9]*\).*/\1/')"#,
            r#"  height=$(printf '%s' "$header" | sed 's/.*"height":\([0-9]*\).*/\1/')"#,
            r#"  bytes=$(printf '%s' "$header" | sed 's/.*"bytes":\([0-9]*\).*/\1/')"#,
            r#"  dd bs=1 count="$bytes" of=/dev/null 2>/dev/null"#,
            "  n=$((n + 1))",
            reply,
            "done",
        ]
        .join("\n")
    }

    /// Checks the header shape and answers with the faces passed as `$1`
    #[cfg(unix)]
    const ECHO_FACES: &str = r#"
  case "$header" in
    *'"format":"bgr24"'*) ;;
    *) printf '{"seq":%s,"error":"unexpected format"}\n' "$seq"; continue ;;
  esac
  if [ $((width * height * 3)) -ne "$bytes" ]; then
    printf '{"seq":%s,"error":"size mismatch"}\n' "$seq"; continue
  fi
  printf '{"seq":%s,"faces":[%s]}\n' "$seq" "$1""#;

    #[cfg(unix)]
    fn test_frame() -> Frame {
        Frame::new(2, 1, vec![1, 2, 3, 4, 5, 6])
    }

    #[test]
    fn test_parse_face_reply() {
        let line = mesh_json(topology::MESH_SIZE).to_string();
        let set = FaceMeshReply::parse(&line)
            .unwrap()
            .into_primary_face()
            .unwrap()
            .expect("face");

        assert_eq!(set.len(), topology::MESH_SIZE);
        assert!((set.point(topology::CHIN).x - 0.152).abs() < 1e-6);
    }

    #[test]
    fn test_parse_no_face() {
        let reply = FaceMeshReply::parse(r#"{"seq":3,"faces":[]}"#).unwrap();
        assert_eq!(reply.seq, Some(3));
        assert!(reply.into_primary_face().unwrap().is_none());
    }

    #[test]
    fn test_first_face_is_primary() {
        let primary: Vec<[f32; 3]> = vec![[0.1, 0.1, 0.1]; topology::MESH_SIZE];
        let other: Vec<[f32; 3]> = vec![[0.9, 0.9, 0.9]; topology::MESH_SIZE];
        let line = serde_json::json!({ "faces": [primary, other] }).to_string();

        let set = FaceMeshReply::parse(&line)
            .unwrap()
            .into_primary_face()
            .unwrap()
            .unwrap();
        assert_eq!(set.point(0), Point3D::new(0.1, 0.1, 0.1));
    }

    #[test]
    fn test_helper_error_reply() {
        let reply = FaceMeshReply::parse(r#"{"error":"model crashed"}"#).unwrap();
        let err = reply.into_primary_face().unwrap_err();
        assert!(matches!(err, DetectorError::Helper(ref m) if m == "model crashed"));
    }

    #[test]
    fn test_truncated_mesh_rejected() {
        let line = mesh_json(68).to_string();
        let err = FaceMeshReply::parse(&line).unwrap().into_primary_face().unwrap_err();
        assert!(matches!(err, DetectorError::TooFewLandmarks { actual: 68, .. }));
    }

    #[test]
    fn test_garbage_reply() {
        assert!(matches!(
            FaceMeshReply::parse("not json"),
            Err(DetectorError::MalformedReply(_))
        ));
    }

    #[tokio::test]
    async fn test_spawn_missing_program() {
        let config = DetectorConfig {
            program: "/nonexistent/face-mesh-helper".to_string(),
            args: Vec::new(),
            ..DetectorConfig::default()
        };
        assert!(matches!(
            FaceMeshProcess::spawn(&config).await,
            Err(DetectorError::Spawn(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_helper_exiting_before_ready() {
        let config = DetectorConfig {
            program: "true".to_string(),
            args: Vec::new(),
            ..DetectorConfig::default()
        };
        assert!(matches!(
            FaceMeshProcess::spawn(&config).await,
            Err(DetectorError::NotReady(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_ready_wait_is_bounded() {
        let config = DetectorConfig {
            ready_timeout_ms: 100,
            ..sh_helper("exec sleep 30", &[])
        };

        let started = std::time::Instant::now();
        let result = FaceMeshProcess::spawn(&config).await;
        assert!(matches!(result, Err(DetectorError::NotReady(ref m)) if m.contains("100 ms")));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_ready_handshake_and_release() {
        let config = sh_helper(r#"echo '{"ready": true}'; exec cat > /dev/null"#, &[]);

        let mut helper = FaceMeshProcess::spawn(&config).await.unwrap();
        assert!(helper.is_running());

        helper.release();
        assert!(!helper.is_running());
        helper.release();

        let frame = test_frame();
        assert!(matches!(
            helper.process(&frame).await,
            Err(DetectorError::Released)
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_frame_exchange_returns_face() {
        let face = vec![[0.25f32, 0.5, 0.0]; topology::MESH_SIZE];
        let face = serde_json::to_string(&face).unwrap();
        let config = sh_helper(&frame_loop(ECHO_FACES), &[&face]);

        let mut helper = FaceMeshProcess::spawn(&config).await.unwrap();
        let frame = test_frame();

        // two frames in a row: the helper consumed exactly `bytes` each time
        for _ in 0..2 {
            let set = helper.process(&frame).await.unwrap().expect("face");
            assert_eq!(set.len(), topology::MESH_SIZE);
            assert_eq!(set.point(topology::NOSE_TIP), Point3D::new(0.25, 0.5, 0.0));
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_frame_exchange_without_face() {
        let config = sh_helper(&frame_loop(ECHO_FACES), &[""]);

        let mut helper = FaceMeshProcess::spawn(&config).await.unwrap();
        let frame = test_frame();
        assert!(helper.process(&frame).await.unwrap().is_none());
        assert!(helper.process(&frame).await.unwrap().is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stray_output_does_not_shift_replies() {
        let reply = r#"
  if [ "$n" -eq 1 ]; then echo 'stray output'; fi
  printf '{"seq":%s,"error":"frame%s"}\n' "$seq" "$seq""#;
        let config = sh_helper(&frame_loop(reply), &[]);

        let mut helper = FaceMeshProcess::spawn(&config).await.unwrap();
        let frame = test_frame();

        assert!(matches!(
            helper.process(&frame).await,
            Err(DetectorError::MalformedReply(_))
        ));
        for expected in ["frame2", "frame3"] {
            let err = helper.process(&frame).await.unwrap_err();
            assert!(
                matches!(err, DetectorError::Helper(ref m) if m == expected),
                "got {:?}",
                err
            );
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_silent_helper_times_out() {
        let config = DetectorConfig {
            reply_timeout_ms: 100,
            ..sh_helper(r#"echo '{"ready": true}'; exec sleep 30"#, &[])
        };

        let mut helper = FaceMeshProcess::spawn(&config).await.unwrap();
        let frame = test_frame();

        let result = tokio::time::timeout(Duration::from_secs(5), helper.process(&frame))
            .await
            .expect("process must be bounded");
        assert!(matches!(result, Err(DetectorError::Timeout(100))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_helper_restarted_after_exit() {
        let marker = std::env::temp_dir().join(format!(
            "face-mesh-restart-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        let marker_arg = marker.to_string_lossy().to_string();

        // first launch exits right after the handshake, later launches serve frames
        let script = format!(
            "if [ ! -e \"$1\" ]; then : > \"$1\"; echo '{{\"ready\": true}}'; exit 0; fi\n{}",
            frame_loop(r#"  printf '{"seq":%s,"faces":[]}\n' "$seq""#)
        );
        let config = sh_helper(&script, &[&marker_arg]);

        let mut helper = FaceMeshProcess::spawn(&config).await.unwrap();
        let frame = test_frame();

        assert!(helper.process(&frame).await.is_err());
        assert!(helper.process(&frame).await.unwrap().is_none());
        assert!(helper.is_running());

        let _ = std::fs::remove_file(&marker);
    }
}
