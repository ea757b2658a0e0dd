//! Isolated headless Chrome sessions over WebDriver.

use std::{io::Cursor, path::Path, time::Duration};

use async_trait::async_trait;
use fantoccini::{Client, ClientBuilder};
use serde_json::{Map, Value, json};
use tokio::process::{Child, Command};

use crate::config::WebDriverConfig;
use crate::foundation::core::Canvas;
use crate::foundation::error::{ReelError, ReelResult};
use crate::page::controller::PageDriver;

const CONNECT_RETRIES: u32 = 40;
const CONNECT_RETRY_DELAY: Duration = Duration::from_millis(150);

/// Opens one exclusive browser page sized to a canvas.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self, canvas: Canvas) -> ReelResult<Box<dyn PageDriver>>;
}

pub struct WebDriverLauncher {
    cfg: WebDriverConfig,
}

impl WebDriverLauncher {
    pub fn new(cfg: WebDriverConfig) -> Self {
        Self { cfg }
    }

    async fn connect(&self, url: &str, canvas: Canvas) -> Result<Client, String> {
        ClientBuilder::native()
            .capabilities(chrome_capabilities(canvas))
            .connect(url)
            .await
            .map_err(|e| e.to_string())
    }

    /// Start a chromedriver that only this session talks to, and connect to it.
    async fn launch_private_driver(&self, canvas: Canvas) -> ReelResult<(Client, Child)> {
        let port = free_local_port()?;
        let url = format!("http://127.0.0.1:{port}");
        let mut child = Command::new(&self.cfg.chromedriver_bin)
            .arg(format!("--port={port}"))
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ReelError::capture(format!(
                    "failed to launch {}: {e}; install chromedriver or start it manually",
                    self.cfg.chromedriver_bin
                ))
            })?;
        tracing::debug!(port, pid = child.id(), "chromedriver spawned");

        let mut last = String::from("no connection attempt made");
        for _ in 0..CONNECT_RETRIES {
            tokio::time::sleep(CONNECT_RETRY_DELAY).await;
            match self.connect(&url, canvas).await {
                Ok(client) => return Ok((client, child)),
                Err(e) => last = e,
            }
            if let Ok(Some(status)) = child.try_wait() {
                return Err(ReelError::capture(format!(
                    "{} exited during startup with {status}",
                    self.cfg.chromedriver_bin
                )));
            }
        }
        let _ = child.kill().await;
        Err(ReelError::capture(format!(
            "failed to connect to spawned webdriver at {url}: {last}"
        )))
    }
}

/// A port the OS reports free right now. The listener is released before returning so the
/// driver can bind it.
fn free_local_port() -> ReelResult<u16> {
    let listener = std::net::TcpListener::bind(("127.0.0.1", 0))
        .map_err(|e| ReelError::capture(format!("failed to reserve a local port: {e}")))?;
    let port = listener
        .local_addr()
        .map_err(|e| ReelError::capture(format!("failed to read reserved port: {e}")))?
        .port();
    Ok(port)
}

pub(crate) fn chrome_capabilities(canvas: Canvas) -> Map<String, Value> {
    let args = vec![
        "--headless=new".to_owned(),
        format!("--window-size={},{}", canvas.width, canvas.height),
        "--force-device-scale-factor=1".to_owned(),
        "--hide-scrollbars".to_owned(),
        "--no-sandbox".to_owned(),
        "--disable-dev-shm-usage".to_owned(),
        "--disable-gpu".to_owned(),
        "--allow-file-access-from-files".to_owned(),
        "--no-first-run".to_owned(),
        "--no-default-browser-check".to_owned(),
        "--log-level=3".to_owned(),
    ];
    let caps = json!({
        "browserName": "chrome",
        "goog:chromeOptions": {
            "args": args,
            "excludeSwitches": ["enable-logging"],
        },
    });
    match caps {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn looks_like_connectivity(err: &str) -> bool {
    ["Connect", "connect failed", "Connection refused", "server did not respond"]
        .iter()
        .any(|needle| err.contains(needle))
}

#[async_trait]
impl BrowserLauncher for WebDriverLauncher {
    #[tracing::instrument(skip(self), fields(url = %self.cfg.url))]
    async fn launch(&self, canvas: Canvas) -> ReelResult<Box<dyn PageDriver>> {
        let (client, driver) = match self.connect(&self.cfg.url, canvas).await {
            Ok(c) => (c, None),
            Err(first) => {
                if !self.cfg.launch || !looks_like_connectivity(&first) {
                    return Err(ReelError::capture(format!(
                        "failed to connect to webdriver at {}: {first}",
                        self.cfg.url
                    )));
                }
                tracing::info!(err = %first, bin = %self.cfg.chromedriver_bin, "webdriver not reachable, launching a private chromedriver");
                let (client, child) = self.launch_private_driver(canvas).await?;
                (client, Some(child))
            }
        };

        let mut session = BrowserSession {
            client,
            driver,
            canvas,
        };
        if let Err(e) = session.fit_viewport().await {
            let _ = Box::new(session).close().await;
            return Err(e);
        }
        Ok(Box::new(session))
    }
}

/// One WebDriver session. A session that had to start its own chromedriver owns that process
/// and nothing else connects to it.
pub struct BrowserSession {
    client: Client,
    driver: Option<Child>,
    canvas: Canvas,
}

impl BrowserSession {
    /// Grow the window so the page viewport equals the canvas.
    async fn fit_viewport(&mut self) -> ReelResult<()> {
        let inner = self
            .client
            .execute("return [window.innerWidth, window.innerHeight];", Vec::new())
            .await
            .map_err(|e| ReelError::capture(format!("viewport probe failed: {e}")))?;
        let (iw, ih) = match inner.as_array().map(|a| a.as_slice()) {
            Some([w, h]) => (w.as_u64().unwrap_or(0), h.as_u64().unwrap_or(0)),
            _ => return Err(ReelError::capture(format!("unexpected viewport probe: {inner}"))),
        };
        let (cw, ch) = (u64::from(self.canvas.width), u64::from(self.canvas.height));
        if iw == cw && ih == ch {
            return Ok(());
        }
        let w = (cw + cw.saturating_sub(iw)) as u32;
        let h = (ch + ch.saturating_sub(ih)) as u32;
        tracing::debug!(iw, ih, w, h, "resizing window to fit canvas");
        self.client
            .set_window_size(w, h)
            .await
            .map_err(|e| ReelError::capture(format!("window resize failed: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl PageDriver for BrowserSession {
    async fn open(&mut self, path: &Path) -> ReelResult<()> {
        let abs = std::path::absolute(path)
            .map_err(|e| ReelError::capture(format!("failed to resolve '{}': {e}", path.display())))?;
        let url = reqwest::Url::from_file_path(&abs)
            .map_err(|_| ReelError::capture(format!("not a file path: '{}'", abs.display())))?;
        self.client
            .goto(url.as_str())
            .await
            .map_err(|e| ReelError::capture(format!("failed to load render document: {e}")))
    }

    async fn evaluate(&mut self, script: &str, args: Vec<Value>) -> ReelResult<Value> {
        self.client
            .execute(script, args)
            .await
            .map_err(|e| ReelError::capture(e.to_string()))
    }

    async fn screenshot_png(&mut self) -> ReelResult<Vec<u8>> {
        let png = self
            .client
            .screenshot()
            .await
            .map_err(|e| ReelError::capture(format!("screenshot failed: {e}")))?;
        fit_to_canvas(png, self.canvas)
    }

    async fn close(self: Box<Self>) -> ReelResult<()> {
        let BrowserSession {
            client, mut driver, ..
        } = *self;
        let result = client
            .close()
            .await
            .map_err(|e| ReelError::capture(format!("failed to end webdriver session: {e}")));
        if let Some(child) = driver.as_mut() {
            let _ = child.kill().await;
        }
        result
    }
}

/// Crop a screenshot to exactly `canvas`. Smaller images cannot be fixed and are rejected.
pub fn fit_to_canvas(png: Vec<u8>, canvas: Canvas) -> ReelResult<Vec<u8>> {
    let reader = image::ImageReader::with_format(Cursor::new(&png), image::ImageFormat::Png);
    let (w, h) = reader
        .into_dimensions()
        .map_err(|e| ReelError::capture(format!("screenshot is not a png: {e}")))?;
    if (w, h) == (canvas.width, canvas.height) {
        return Ok(png);
    }
    if w < canvas.width || h < canvas.height {
        return Err(ReelError::capture(format!(
            "screenshot {w}x{h} is smaller than canvas {}x{}",
            canvas.width, canvas.height
        )));
    }
    let img = image::load_from_memory_with_format(&png, image::ImageFormat::Png)
        .map_err(|e| ReelError::capture(format!("screenshot decode failed: {e}")))?;
    let cropped = img.crop_imm(0, 0, canvas.width, canvas.height);
    let mut out = Cursor::new(Vec::new());
    cropped
        .write_to(&mut out, image::ImageFormat::Png)
        .map_err(|e| ReelError::capture(format!("screenshot encode failed: {e}")))?;
    Ok(out.into_inner())
}
