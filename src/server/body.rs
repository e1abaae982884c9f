//! HTTP Body 类型定义
//!
//! 所有响应统一使用 BoxBody：普通 JSON 用 `full`，就绪状态流用 `ndjson`

use crate::services::model::ReadinessStream;
use bytes::Bytes;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::{Body, Frame};
use pin_project_lite::pin_project;
use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pin_project! {
    pub struct BoxBody {
        #[pin]
        inner: Pin<Box<dyn Body<Data = Bytes, Error = BoxError> + Send>>,
    }
}

impl Body for BoxBody {
    type Data = Bytes;
    type Error = BoxError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        self.project().inner.poll_frame(cx)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> hyper::body::SizeHint {
        self.inner.size_hint()
    }
}

pub fn box_body<B>(body: B) -> BoxBody
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    BoxBody {
        inner: Box::pin(body.map_err(Into::into)),
    }
}

pub fn full(bytes: impl Into<Bytes>) -> BoxBody {
    box_body(Full::new(bytes.into()))
}

/// 就绪状态流，每个状态一行 JSON
///
/// 客户端断开时 body 被 drop，订阅随之释放
pub fn ndjson(stream: ReadinessStream) -> BoxBody {
    let frames = futures_util::stream::unfold(stream, |mut stream| async move {
        let state = stream.next().await?;
        let mut line = match serde_json::to_vec(&state) {
            Ok(line) => line,
            Err(e) => {
                tracing::error!(model = %state.model, error = ?e, "序列化就绪状态失败");
                return None;
            }
        };
        line.push(b'\n');
        Some((Ok::<_, Infallible>(Frame::data(Bytes::from(line))), stream))
    });
    box_body(StreamBody::new(frames))
}
