//! 搜索索引推送
//!
//! 索引文档以影像ID为键推送到搜索后端，重复推送同一键会覆盖旧文档。
//! 提供内存实现（测试、演练模式）和兼容 Elasticsearch/OpenSearch 的HTTP实现。

use crate::models::ImageIndex;
use async_trait::async_trait;
use imaging_core::{IndexError, Result};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// 搜索索引推送接口
#[async_trait]
pub trait SearchIndexSink: Send + Sync {
    /// 获取推送目标名称
    fn name(&self) -> &str;

    /// 准备索引结构
    async fn prepare(&self) -> Result<()> {
        Ok(())
    }

    /// 推送单个文档
    async fn submit(&self, document: &ImageIndex) -> Result<()>;

    /// 批量推送文档
    async fn submit_many(&self, documents: &[ImageIndex]) -> Result<()> {
        for document in documents {
            self.submit(document).await?;
        }
        Ok(())
    }

    /// 删除文档，文档不存在时不报错
    async fn delete(&self, key: &str) -> Result<()>;
}

/// 内存索引
#[derive(Debug, Default)]
pub struct InMemoryIndexSink {
    documents: RwLock<HashMap<String, ImageIndex>>,
}

impl InMemoryIndexSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, key: &str) -> Option<ImageIndex> {
        self.documents.read().await.get(key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }
}

#[async_trait]
impl SearchIndexSink for InMemoryIndexSink {
    fn name(&self) -> &str {
        "memory"
    }

    async fn submit(&self, document: &ImageIndex) -> Result<()> {
        self.documents
            .write()
            .await
            .insert(document.id.clone(), document.clone());
        Ok(())
    }

    async fn submit_many(&self, documents: &[ImageIndex]) -> Result<()> {
        let mut guard = self.documents.write().await;
        for document in documents {
            guard.insert(document.id.clone(), document.clone());
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.documents.write().await.remove(key);
        Ok(())
    }
}

/// HTTP搜索后端
pub struct HttpIndexSink {
    client: reqwest::Client,
    endpoint: String,
    index: String,
    credentials: Option<(String, String)>,
}

impl HttpIndexSink {
    pub fn new(endpoint: &str, index: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IndexError::Config(format!("无法创建HTTP客户端: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            index: index.to_string(),
            credentials: None,
        })
    }

    /// 使用基本认证
    pub fn with_basic_auth(mut self, username: &str, password: &str) -> Self {
        self.credentials = Some((username.to_string(), password.to_string()));
        self
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let request = self
            .client
            .request(method, format!("{}/{}", self.endpoint, path));

        match &self.credentials {
            Some((username, password)) => request.basic_auth(username, Some(password)),
            None => request,
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<(reqwest::StatusCode, String)> {
        let response = request.send().await.map_err(sink_error)?;
        let status = response.status();
        let body = response.text().await.map_err(sink_error)?;
        Ok((status, body))
    }
}

#[async_trait]
impl SearchIndexSink for HttpIndexSink {
    fn name(&self) -> &str {
        &self.index
    }

    async fn prepare(&self) -> Result<()> {
        let (status, body) = self.send(self.request(reqwest::Method::PUT, &self.index)).await?;

        if status.is_success() {
            info!("Created search index {}", self.index);
            Ok(())
        } else if body.contains("resource_already_exists_exception") {
            debug!("Search index {} already exists", self.index);
            Ok(())
        } else {
            Err(IndexError::Sink(format!(
                "创建索引 {} 失败: {} {}",
                self.index, status, body
            )))
        }
    }

    async fn submit(&self, document: &ImageIndex) -> Result<()> {
        let path = format!("{}/_doc/{}", self.index, document.id);
        let request = self.request(reqwest::Method::PUT, &path).json(document);
        let (status, body) = self.send(request).await?;

        if !status.is_success() {
            return Err(IndexError::Sink(format!(
                "推送文档 {} 失败: {} {}",
                document.id, status, body
            )));
        }
        Ok(())
    }

    async fn submit_many(&self, documents: &[ImageIndex]) -> Result<()> {
        if documents.is_empty() {
            return Ok(());
        }

        let request = self
            .request(reqwest::Method::POST, "_bulk")
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(bulk_body(&self.index, documents)?);
        let (status, body) = self.send(request).await?;

        if !status.is_success() {
            return Err(IndexError::Sink(format!("批量推送失败: {} {}", status, body)));
        }

        let failed = bulk_failures(&body)?;
        if !failed.is_empty() {
            return Err(IndexError::Sink(format!(
                "批量推送中 {} 个文档失败: {}",
                failed.len(),
                failed.join(", ")
            )));
        }

        debug!("Bulk submitted {} documents to {}", documents.len(), self.index);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = format!("{}/_doc/{}", self.index, key);
        let (status, body) = self.send(self.request(reqwest::Method::DELETE, &path)).await?;

        if status == reqwest::StatusCode::NOT_FOUND {
            warn!("Document {} not present in {}, nothing to delete", key, self.index);
            Ok(())
        } else if status.is_success() {
            Ok(())
        } else {
            Err(IndexError::Sink(format!("删除文档 {} 失败: {} {}", key, status, body)))
        }
    }
}

fn sink_error(e: reqwest::Error) -> IndexError {
    IndexError::Sink(e.to_string())
}

/// 生成 `_bulk` 请求体（NDJSON，每个文档一行动作加一行内容）
pub fn bulk_body(index: &str, documents: &[ImageIndex]) -> Result<String> {
    let mut body = String::new();

    for document in documents {
        let action = serde_json::json!({ "index": { "_index": index, "_id": document.id } });
        body.push_str(&serde_json::to_string(&action)?);
        body.push('\n');
        body.push_str(&serde_json::to_string(document)?);
        body.push('\n');
    }

    Ok(body)
}

/// 从 `_bulk` 响应中提取失败的文档键
fn bulk_failures(body: &str) -> Result<Vec<String>> {
    let response: serde_json::Value = serde_json::from_str(body)?;

    if !response["errors"].as_bool().unwrap_or(false) {
        return Ok(Vec::new());
    }

    let failed = response["items"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("index"))
                .filter(|result| result.get("error").is_some())
                .map(|result| result["_id"].as_str().unwrap_or("?").to_string())
                .collect()
        })
        .unwrap_or_default();

    Ok(failed)
}
