use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::{Client, RequestBuilder, StatusCode, header};
use tracing::debug;
use url::Url;

use crate::{
    error::{NetError, NetResult},
    traits::{ByteResponse, Net},
    types::{Headers, NetOptions, RangeSpec, parse_content_range_total},
};

/// reqwest-backed [`Net`]. Body streams carry no timeout.
#[derive(Clone, Debug)]
pub struct HttpClient {
    inner: Client,
    options: NetOptions,
}

impl HttpClient {
    pub fn new(options: NetOptions) -> NetResult<Self> {
        let mut builder = Client::builder().pool_max_idle_per_host(options.pool_max_idle_per_host);
        if let Some(agent) = &options.user_agent {
            builder = builder.user_agent(agent.clone());
        }
        let inner = builder.build().map_err(|e| NetError::Build(e.to_string()))?;
        Ok(Self { inner, options })
    }

    fn apply_headers(&self, mut req: RequestBuilder, headers: Option<Headers>) -> RequestBuilder {
        for (k, v) in self.options.headers.iter() {
            req = req.header(k, v);
        }
        if let Some(headers) = headers {
            for (k, v) in headers.iter() {
                req = req.header(k, v);
            }
        }
        req
    }

    async fn send(&self, req: RequestBuilder, url: &Url) -> NetResult<reqwest::Response> {
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(NetError::http_status(status.as_u16(), url.as_str()));
        }
        Ok(resp)
    }
}

#[async_trait]
impl Net for HttpClient {
    async fn stream(&self, url: &Url, headers: Option<Headers>) -> NetResult<ByteResponse> {
        let req = self.apply_headers(self.inner.get(url.clone()), headers);
        let resp = self.send(req, url).await?;
        let total_len = resp.content_length();
        debug!(%url, ?total_len, "stream opened");

        Ok(ByteResponse {
            offset: 0,
            total_len,
            stream: Box::pin(resp.bytes_stream().map_err(NetError::from)),
        })
    }

    async fn get_range(
        &self,
        url: &Url,
        range: RangeSpec,
        headers: Option<Headers>,
    ) -> NetResult<ByteResponse> {
        let req = self
            .inner
            .get(url.clone())
            .header(header::RANGE, range.to_header_value());
        let req = self.apply_headers(req, headers);
        let resp = self.send(req, url).await?;

        let status = resp.status();
        if status != StatusCode::PARTIAL_CONTENT {
            // A 200 for `bytes=0-` is the same byte sequence.
            if range.start == 0 && range.end.is_none() {
                let total_len = resp.content_length();
                return Ok(ByteResponse {
                    offset: 0,
                    total_len,
                    stream: Box::pin(resp.bytes_stream().map_err(NetError::from)),
                });
            }
            return Err(NetError::RangeNotSatisfied {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let total_len = resp
            .headers()
            .get(header::CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range_total);
        debug!(%url, range = %range.to_header_value(), ?total_len, "range opened");

        Ok(ByteResponse {
            offset: range.start,
            total_len,
            stream: Box::pin(resp.bytes_stream().map_err(NetError::from)),
        })
    }
}
