//! EasyOCR and PaddleOCR engines.
//!
//! Both libraries only exist for Python, so the engine drives a bridge
//! script run by the configured interpreter. The bridge is started once by
//! [`PythonEngine::probe`], loads the model a single time and then serves
//! every page of the run:
//!
//! ```text
//! ocr2md ── "/tmp/ocr2md-1.png\n" ──▶ bridge (model loaded once)
//!        ◀── {"boxes": [...]}\n ────
//! ```
//!
//! The first reply line is `{"ready": true}` or `{"error": "..."}`. Library
//! chatter on stdout is redirected to stderr, which is forwarded to the
//! `debug` log. Dropping the engine kills the bridge.

use crate::config::ExtractionConfig;
use crate::error::OcrError;
use crate::pipeline::encode::png_bytes;
use image::DynamicImage;
use serde::Deserialize;
use std::fmt;
use std::io::ErrorKind;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::debug;

/// First start may download model weights.
const BRIDGE_START_TIMEOUT: Duration = Duration::from_secs(600);
const BRIDGE_PAGE_TIMEOUT: Duration = Duration::from_secs(300);

const BRIDGE_PRELUDE: &str = r#"
import json, sys
out, sys.stdout = sys.stdout, sys.stderr

def reply(obj):
    out.write(json.dumps(obj, ensure_ascii=False) + "\n")
    out.flush()

def box_of(points, text, conf):
    xs = [float(p[0]) for p in points]
    ys = [float(p[1]) for p in points]
    return {"text": text, "x0": min(xs), "y0": min(ys), "x1": max(xs), "y1": max(ys), "conf": float(conf)}
"#;

const EASYOCR_BRIDGE: &str = r#"
def load(langs):
    import easyocr
    return easyocr.Reader(langs or ["en"], gpu=False, verbose=False)

def recognise(reader, path):
    return [box_of(b, t, c) for b, t, c in reader.readtext(path, detail=1)]
"#;

const PADDLEOCR_BRIDGE: &str = r#"
def load(langs):
    from paddleocr import PaddleOCR
    return PaddleOCR(use_angle_cls=True, lang=(langs or ["en"])[0], show_log=False)

def recognise(ocr, path):
    result = ocr.ocr(path, cls=True)
    lines = (result[0] or []) if result else []
    return [box_of(box, text, conf) for box, (text, conf) in lines]
"#;

const BRIDGE_SERVE: &str = r#"
try:
    engine = load([l for l in sys.argv[1].split(",") if l])
except Exception as e:
    reply({"error": f"{type(e).__name__}: {e}"})
    sys.exit(1)
reply({"ready": True})

for line in sys.stdin:
    path = line.strip()
    if not path:
        continue
    try:
        reply({"boxes": recognise(engine, path)})
    except Exception as e:
        reply({"error": f"{type(e).__name__}: {e}"})
"#;

/// Which Python OCR library to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PythonFlavor {
    EasyOcr,
    PaddleOcr,
}

impl PythonFlavor {
    fn engine_name(&self) -> &'static str {
        match self {
            PythonFlavor::EasyOcr => "easyocr",
            PythonFlavor::PaddleOcr => "paddleocr",
        }
    }

    fn module(&self) -> &'static str {
        match self {
            PythonFlavor::EasyOcr => "easyocr",
            PythonFlavor::PaddleOcr => "paddleocr",
        }
    }

    fn pip_package(&self) -> &'static str {
        match self {
            PythonFlavor::EasyOcr => "easyocr",
            PythonFlavor::PaddleOcr => "paddleocr paddlepaddle",
        }
    }

    fn bridge_script(&self) -> String {
        let body = match self {
            PythonFlavor::EasyOcr => EASYOCR_BRIDGE,
            PythonFlavor::PaddleOcr => PADDLEOCR_BRIDGE,
        };
        format!("{BRIDGE_PRELUDE}{body}{BRIDGE_SERVE}")
    }
}

/// One recognised word or phrase with its bounding box, in pixels.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WordBox {
    pub text: String,
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
    #[serde(default)]
    pub conf: f32,
}

impl WordBox {
    fn center_y(&self) -> f32 {
        (self.y0 + self.y1) / 2.0
    }

    fn height(&self) -> f32 {
        (self.y1 - self.y0).abs()
    }
}

/// One JSON line written by the bridge.
#[derive(Debug, Default, Deserialize)]
struct BridgeReply {
    #[serde(default)]
    ready: bool,
    #[serde(default)]
    boxes: Option<Vec<WordBox>>,
    #[serde(default)]
    error: Option<String>,
}

/// The running bridge process and its pipes.
struct Bridge {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    /// Cleared once a request timed out; later replies would be out of step.
    alive: bool,
}

impl Bridge {
    /// Next JSON reply, skipping any stray non-JSON lines.
    async fn read_reply(&mut self) -> Result<Option<BridgeReply>, std::io::Error> {
        while let Some(line) = self.stdout.next_line().await? {
            let line = line.trim();
            if !line.starts_with('{') {
                if !line.is_empty() {
                    debug!("bridge: {}", line);
                }
                continue;
            }
            match serde_json::from_str::<BridgeReply>(line) {
                Ok(reply) => return Ok(Some(reply)),
                Err(e) => debug!("bridge: unparsable line ({e}): {line}"),
            }
        }
        Ok(None)
    }
}

/// A probed Python OCR engine with its model loaded.
pub struct PythonEngine {
    flavor: PythonFlavor,
    python: String,
    bridge: Mutex<Bridge>,
}

impl fmt::Debug for PythonEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PythonEngine")
            .field("flavor", &self.flavor)
            .field("python", &self.python)
            .finish_non_exhaustive()
    }
}

impl PythonEngine {
    /// Check that the interpreter can import the OCR package, then start
    /// the bridge and wait until the model is loaded.
    pub async fn probe(flavor: PythonFlavor, config: &ExtractionConfig) -> Result<Self, OcrError> {
        let python = config.python_cmd();
        let engine = flavor.engine_name();
        let output = Command::new(&python)
            .arg("-c")
            .arg(format!("import {}", flavor.module()))
            .output()
            .await
            .map_err(|e| spawn_error(flavor, &python, e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let hint = if stderr.contains("No module named") {
                format!(
                    "Python package '{}' is not installed for '{python}'; try: {python} -m pip install {}",
                    flavor.module(),
                    flavor.pip_package()
                )
            } else {
                format!("'{python}' cannot import {}: {}", flavor.module(), last_line(&stderr))
            };
            return Err(OcrError::EngineUnavailable {
                engine: engine.into(),
                hint,
            });
        }

        let mut bridge = spawn_bridge(flavor, &python, &config.python_languages())?;
        let ready = tokio::time::timeout(BRIDGE_START_TIMEOUT, bridge.read_reply())
            .await
            .map_err(|_| OcrError::EngineUnavailable {
                engine: engine.into(),
                hint: format!(
                    "model did not load within {}s",
                    BRIDGE_START_TIMEOUT.as_secs()
                ),
            })?
            .map_err(|e| OcrError::EngineFailed {
                engine: engine.into(),
                detail: format!("cannot read bridge output: {e}"),
            })?;

        match ready {
            Some(BridgeReply { ready: true, .. }) => {}
            Some(BridgeReply {
                error: Some(err), ..
            }) => {
                return Err(OcrError::EngineUnavailable {
                    engine: engine.into(),
                    hint: format!("model failed to load: {err}"),
                })
            }
            _ => {
                return Err(OcrError::EngineUnavailable {
                    engine: engine.into(),
                    hint: "bridge exited before the model was ready (run with --verbose for its log)"
                        .into(),
                })
            }
        }

        debug!("{} model loaded via '{}'", engine, python);
        Ok(Self {
            flavor,
            python,
            bridge: Mutex::new(bridge),
        })
    }

    pub fn flavor(&self) -> PythonFlavor {
        self.flavor
    }

    /// Recognise the text in `image`.
    ///
    /// EasyOCR output goes through [`layout_markdown`]; PaddleOCR output is
    /// regrouped into plain reading-order lines.
    pub async fn recognise(&self, image: &DynamicImage) -> Result<String, OcrError> {
        let engine = self.flavor.engine_name();
        let image = image.clone();
        let png = tokio::task::spawn_blocking(move || png_bytes(&image))
            .await
            .map_err(|e| OcrError::Internal(format!("Encode task panicked: {e}")))??;

        let file = tempfile::Builder::new()
            .prefix("ocr2md-")
            .suffix(".png")
            .tempfile()
            .map_err(|e| OcrError::Internal(format!("Cannot create temp image: {e}")))?;
        tokio::fs::write(file.path(), &png)
            .await
            .map_err(|e| OcrError::Internal(format!("Cannot write temp image: {e}")))?;

        let failed = |detail: String| OcrError::EngineFailed {
            engine: engine.into(),
            detail,
        };

        let mut bridge = self.bridge.lock().await;
        if !bridge.alive {
            return Err(failed("bridge stopped after an earlier timeout".into()));
        }

        let request = format!("{}\n", file.path().to_string_lossy());
        bridge
            .stdin
            .write_all(request.as_bytes())
            .await
            .map_err(|e| failed(format!("bridge is gone: {e}")))?;
        bridge
            .stdin
            .flush()
            .await
            .map_err(|e| failed(format!("bridge is gone: {e}")))?;

        let reply = match tokio::time::timeout(BRIDGE_PAGE_TIMEOUT, bridge.read_reply()).await {
            Ok(reply) => reply.map_err(|e| failed(format!("cannot read bridge output: {e}")))?,
            Err(_) => {
                bridge.alive = false;
                let _ = bridge.child.start_kill();
                return Err(failed(format!(
                    "no result within {}s",
                    BRIDGE_PAGE_TIMEOUT.as_secs()
                )));
            }
        };

        let boxes = match reply {
            Some(BridgeReply {
                boxes: Some(boxes), ..
            }) => boxes,
            Some(BridgeReply {
                error: Some(err), ..
            }) => return Err(failed(err)),
            Some(_) => return Err(failed("bridge reply carried no result".into())),
            None => {
                bridge.alive = false;
                return Err(failed("bridge exited".into()));
            }
        };
        debug!("{}: {} boxes", engine, boxes.len());

        Ok(match self.flavor {
            PythonFlavor::EasyOcr => layout_markdown(boxes),
            PythonFlavor::PaddleOcr => group_lines(boxes),
        })
    }
}

fn spawn_bridge(
    flavor: PythonFlavor,
    python: &str,
    languages: &[String],
) -> Result<Bridge, OcrError> {
    let engine = flavor.engine_name();
    let mut child = Command::new(python)
        .arg("-c")
        .arg(flavor.bridge_script())
        .arg(languages.join(","))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| spawn_error(flavor, python, e))?;

    let missing = |pipe: &str| OcrError::Internal(format!("{engine} bridge {pipe} not captured"));
    let stdin = child.stdin.take().ok_or_else(|| missing("stdin"))?;
    let stdout = child.stdout.take().ok_or_else(|| missing("stdout"))?;
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!("{}: {}", engine, line);
            }
        });
    }

    Ok(Bridge {
        child,
        stdin,
        stdout: BufReader::new(stdout).lines(),
        alive: true,
    })
}

fn spawn_error(flavor: PythonFlavor, python: &str, e: std::io::Error) -> OcrError {
    if e.kind() == ErrorKind::NotFound {
        OcrError::EngineUnavailable {
            engine: flavor.engine_name().into(),
            hint: format!("Python interpreter '{python}' not found; set OCR2MD_PYTHON"),
        }
    } else {
        OcrError::EngineFailed {
            engine: flavor.engine_name().into(),
            detail: format!("cannot run '{python}': {e}"),
        }
    }
}

fn last_line(s: &str) -> &str {
    s.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or("").trim()
}

/// Sort boxes into rows, top-to-bottom, each row left-to-right.
///
/// Boxes are sorted by vertical centre; a new row starts when the centre
/// moves by more than half the median box height.
fn group_rows(boxes: Vec<WordBox>) -> Vec<Vec<WordBox>> {
    let mut boxes: Vec<WordBox> = boxes
        .into_iter()
        .filter(|b| !b.text.trim().is_empty())
        .collect();
    if boxes.is_empty() {
        return Vec::new();
    }

    let mut heights: Vec<f32> = boxes.iter().map(WordBox::height).collect();
    heights.sort_by(f32::total_cmp);
    let threshold = (heights[heights.len() / 2] / 2.0).max(1.0);

    boxes.sort_by(|a, b| a.center_y().total_cmp(&b.center_y()));

    let mut rows: Vec<Vec<WordBox>> = Vec::new();
    let mut prev_center: Option<f32> = None;
    for b in boxes {
        let center = b.center_y();
        match (rows.last_mut(), prev_center) {
            (Some(row), Some(prev)) if (center - prev).abs() <= threshold => row.push(b),
            _ => rows.push(vec![b]),
        }
        prev_center = Some(center);
    }
    for row in &mut rows {
        row.sort_by(|a, b| a.x0.total_cmp(&b.x0));
    }
    rows
}

/// Regroup word boxes into plain lines in reading order.
pub fn group_lines(boxes: Vec<WordBox>) -> String {
    group_rows(boxes)
        .iter()
        .map(|row| {
            row.iter()
                .map(|b| b.text.trim())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Merge the boxes of one row into cells; a horizontal gap wider than the
/// taller neighbour's height starts a new cell.
fn row_cells(row: &[WordBox]) -> Vec<String> {
    let mut cells: Vec<String> = Vec::new();
    let mut prev: Option<&WordBox> = None;
    for b in row {
        let text = b.text.trim();
        match (prev, cells.last_mut()) {
            (Some(p), Some(cell)) if b.x0 - p.x1 <= p.height().max(b.height()) => {
                cell.push(' ');
                cell.push_str(text);
            }
            _ => cells.push(text.to_string()),
        }
        prev = Some(b);
    }
    cells
}

enum Block {
    Title(String),
    Text(Vec<String>),
    Table(Vec<String>),
}

/// Rebuild simple page structure from EasyOCR boxes.
///
/// The first row longer than five characters becomes the `#` title. Rows
/// split into two or more cells become table rows; consecutive rows share
/// one table. Everything else is running text.
pub fn layout_markdown(boxes: Vec<WordBox>) -> String {
    let mut blocks: Vec<Block> = Vec::new();
    let mut title_set = false;

    for row in group_rows(boxes) {
        let cells = row_cells(&row);
        let text = cells.join(" ");
        if !title_set && text.chars().count() > 5 {
            title_set = true;
            blocks.push(Block::Title(text));
        } else if cells.len() >= 2 {
            let escaped: Vec<String> = cells.iter().map(|c| c.replace('|', "\\|")).collect();
            let line = format!("| {} |", escaped.join(" | "));
            match blocks.last_mut() {
                Some(Block::Table(rows)) => rows.push(line),
                _ => blocks.push(Block::Table(vec![line])),
            }
        } else {
            match blocks.last_mut() {
                Some(Block::Text(lines)) => lines.push(text),
                _ => blocks.push(Block::Text(vec![text])),
            }
        }
    }

    blocks
        .into_iter()
        .map(|block| match block {
            Block::Title(t) => format!("# {t}"),
            Block::Text(lines) => lines.join("\n"),
            Block::Table(rows) => rows.join("\n"),
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
