//! Low-level Chrome DevTools Protocol (CDP) client over WebSocket.
//!
//! Speaks to one page target: sends commands, matches responses by id and
//! fans events out to subscribers.

use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, error, warn};

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Value>>>>;
type Listeners = Arc<Mutex<HashMap<String, Vec<mpsc::Sender<Value>>>>>;

pub struct CdpClient {
    ws_tx: mpsc::Sender<String>,
    pending: Pending,
    next_id: AtomicU64,
    event_listeners: Listeners,
    command_timeout: Duration,
    reader_handle: tokio::task::JoinHandle<()>,
    writer_handle: tokio::task::JoinHandle<()>,
}

impl CdpClient {
    /// Connect to a CDP WebSocket endpoint.
    pub async fn connect(ws_url: &str, command_timeout: Duration) -> Result<Self, String> {
        use futures::{SinkExt, StreamExt};
        use tokio_tungstenite::connect_async;
        use tokio_tungstenite::tungstenite::Message;

        let (ws_stream, _) = connect_async(ws_url)
            .await
            .map_err(|e| format!("Failed to connect to CDP endpoint {}: {}", ws_url, e))?;

        let (mut ws_sink, mut ws_read) = ws_stream.split();
        let (ws_tx, mut ws_rx) = mpsc::channel::<String>(256);

        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let pending_clone = pending.clone();
        let event_listeners: Listeners = Arc::new(Mutex::new(HashMap::new()));
        let events_clone = event_listeners.clone();

        let writer_handle = tokio::spawn(async move {
            while let Some(msg) = ws_rx.recv().await {
                if let Err(e) = ws_sink.send(Message::Text(msg)).await {
                    error!(error = %e, "CDP WebSocket write error");
                    break;
                }
            }
        });

        let reader_handle = tokio::spawn(async move {
            while let Some(msg_result) = ws_read.next().await {
                match msg_result {
                    Ok(Message::Text(text)) => {
                        let Ok(val) = serde_json::from_str::<Value>(&text) else {
                            continue;
                        };
                        if let Some(id) = val.get("id").and_then(|v| v.as_u64()) {
                            if let Some(tx) = pending_clone.lock().await.remove(&id) {
                                let _ = tx.send(val);
                            }
                        } else if let Some(method) = val.get("method").and_then(|v| v.as_str()) {
                            let listeners = events_clone.lock().await;
                            if let Some(senders) = listeners.get(method) {
                                let params = val.get("params").cloned().unwrap_or(Value::Null);
                                for tx in senders {
                                    let _ = tx.try_send(params.clone());
                                }
                            }
                        }
                    }
                    Ok(Message::Close(_)) => {
                        debug!("CDP WebSocket closed by browser");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "CDP WebSocket read error");
                        break;
                    }
                    _ => {}
                }
            }
            // Fail in-flight commands now instead of at their timeout.
            pending_clone.lock().await.clear();
        });

        Ok(Self {
            ws_tx,
            pending,
            next_id: AtomicU64::new(1),
            event_listeners,
            command_timeout,
            reader_handle,
            writer_handle,
        })
    }

    /// Send a CDP command and wait for its `result`.
    pub async fn send_command(&self, method: &str, params: Value) -> Result<Value, String> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let msg = json!({
            "id": id,
            "method": method,
            "params": params,
        });

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        self.ws_tx
            .send(msg.to_string())
            .await
            .map_err(|e| format!("Failed to send CDP command: {}", e))?;

        match tokio::time::timeout(self.command_timeout, rx).await {
            Ok(Ok(response)) => {
                if let Some(error) = response.get("error") {
                    Err(format!("CDP error in {}: {}", method, error))
                } else {
                    Ok(response.get("result").cloned().unwrap_or(Value::Null))
                }
            }
            Ok(Err(_)) => Err("CDP response channel closed".to_string()),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(format!(
                    "CDP command '{}' timed out after {}s",
                    method,
                    self.command_timeout.as_secs()
                ))
            }
        }
    }

    /// Subscribe to a CDP event. The receiver gets each event's params.
    pub async fn subscribe_event(&self, method: &str) -> mpsc::Receiver<Value> {
        let (tx, rx) = mpsc::channel(64);
        self.event_listeners
            .lock()
            .await
            .entry(method.to_string())
            .or_default()
            .push(tx);
        rx
    }

    pub async fn enable_domain(&self, domain: &str) -> Result<(), String> {
        self.send_command(&format!("{}.enable", domain), json!({})).await?;
        Ok(())
    }

    pub async fn navigate(&self, url: &str) -> Result<Value, String> {
        self.send_command("Page.navigate", json!({"url": url})).await
    }

    /// Evaluate JavaScript and return the raw `Runtime.evaluate` result.
    pub async fn evaluate_js(&self, expression: &str) -> Result<Value, String> {
        self.send_command(
            "Runtime.evaluate",
            json!({
                "expression": expression,
                "returnByValue": true,
                "awaitPromise": true,
            }),
        )
        .await
    }

    /// Evaluate JavaScript and keep the result as a remote object.
    pub async fn evaluate_handle(&self, expression: &str) -> Result<Value, String> {
        self.send_command(
            "Runtime.evaluate",
            json!({
                "expression": expression,
                "returnByValue": false,
            }),
        )
        .await
    }

    /// Own enumerable properties of a remote object (array elements included).
    pub async fn get_properties(&self, object_id: &str) -> Result<Vec<Value>, String> {
        let result = self
            .send_command(
                "Runtime.getProperties",
                json!({"objectId": object_id, "ownProperties": true}),
            )
            .await?;
        Ok(result
            .get("result")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default())
    }

    pub async fn release_object(&self, object_id: &str) -> Result<(), String> {
        self.send_command("Runtime.releaseObject", json!({"objectId": object_id}))
            .await?;
        Ok(())
    }

    /// Backend node id for a remote object, stable across queries.
    pub async fn backend_node_id(&self, object_id: &str) -> Result<i64, String> {
        let result = self
            .send_command("DOM.describeNode", json!({"objectId": object_id}))
            .await?;
        result
            .get("node")
            .and_then(|n| n.get("backendNodeId"))
            .and_then(|v| v.as_i64())
            .ok_or_else(|| "describeNode returned no backendNodeId".to_string())
    }

    /// Call a function with `this` bound to a remote object.
    pub async fn call_function_on(
        &self,
        object_id: &str,
        function_declaration: &str,
        args: Vec<Value>,
    ) -> Result<Value, String> {
        let arguments: Vec<Value> = args.into_iter().map(|v| json!({"value": v})).collect();
        self.send_command(
            "Runtime.callFunctionOn",
            json!({
                "objectId": object_id,
                "functionDeclaration": function_declaration,
                "arguments": arguments,
                "returnByValue": true,
                "awaitPromise": true,
            }),
        )
        .await
    }

    pub async fn get_box_model(&self, backend_node_id: i64) -> Result<Value, String> {
        self.send_command("DOM.getBoxModel", json!({"backendNodeId": backend_node_id}))
            .await
    }

    pub async fn dispatch_mouse_event(
        &self,
        event_type: &str,
        x: f64,
        y: f64,
        click_count: i32,
    ) -> Result<(), String> {
        self.send_command(
            "Input.dispatchMouseEvent",
            json!({
                "type": event_type,
                "x": x,
                "y": y,
                "button": "left",
                "clickCount": click_count,
            }),
        )
        .await?;
        Ok(())
    }

    /// Insert text at the focused element (bypasses key events).
    pub async fn insert_text(&self, text: &str) -> Result<(), String> {
        self.send_command("Input.insertText", json!({"text": text})).await?;
        Ok(())
    }

    pub async fn set_viewport(&self, width: u32, height: u32) -> Result<(), String> {
        self.send_command(
            "Emulation.setDeviceMetricsOverride",
            json!({
                "width": width,
                "height": height,
                "deviceScaleFactor": 1,
                "mobile": false,
            }),
        )
        .await?;
        Ok(())
    }

    /// Base64 PNG.
    pub async fn screenshot(&self, full_page: bool) -> Result<String, String> {
        let mut params = json!({"format": "png"});
        if full_page {
            params["captureBeyondViewport"] = json!(true);
        }
        let result = self.send_command("Page.captureScreenshot", params).await?;
        data_field(&result, "screenshot")
    }

    /// Base64 PDF.
    pub async fn print_to_pdf(&self, params: Value) -> Result<String, String> {
        let result = self.send_command("Page.printToPDF", params).await?;
        data_field(&result, "PDF")
    }

    pub async fn set_file_input_files_by_object(
        &self,
        files: Vec<String>,
        object_id: &str,
    ) -> Result<(), String> {
        self.send_command(
            "DOM.setFileInputFiles",
            json!({"files": files, "objectId": object_id}),
        )
        .await?;
        Ok(())
    }

    pub async fn set_file_input_files_by_backend(
        &self,
        files: Vec<String>,
        backend_node_id: i64,
    ) -> Result<(), String> {
        self.send_command(
            "DOM.setFileInputFiles",
            json!({"files": files, "backendNodeId": backend_node_id}),
        )
        .await?;
        Ok(())
    }

    /// While enabled, native file pickers are suppressed and reported as
    /// `Page.fileChooserOpened` events.
    pub async fn set_intercept_file_chooser(&self, enabled: bool) -> Result<(), String> {
        self.send_command(
            "Page.setInterceptFileChooserDialog",
            json!({"enabled": enabled}),
        )
        .await?;
        Ok(())
    }
}

fn data_field(result: &Value, what: &str) -> Result<String, String> {
    result
        .get("data")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| format!("No {} data returned", what))
}

impl Drop for CdpClient {
    fn drop(&mut self) {
        self.reader_handle.abort();
        self.writer_handle.abort();
    }
}
