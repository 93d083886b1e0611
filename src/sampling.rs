use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use mongodb::Cursor;
use mongodb::bson::{Document, doc};
use rand::seq::IteratorRandom;

use crate::error::{DataServiceError, Result};

pub const DEFAULT_SAMPLE_SIZE: u64 = 1000;

/// Options for drawing a random subset of a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleOptions {
    pub size: u64,
    pub filter: Option<Document>,
    pub projection: Option<Document>,
}

impl Default for SampleOptions {
    fn default() -> Self {
        Self { size: DEFAULT_SAMPLE_SIZE, filter: None, projection: None }
    }
}

/// Builds the aggregation pipeline for a server-side sample: an optional
/// `$match`, the `$sample` stage, and an optional `$project`, in that order.
/// `$match` must precede `$sample` so the size applies to the filtered set.
pub fn sample_pipeline(options: &SampleOptions) -> Vec<Document> {
    let mut pipeline = Vec::with_capacity(3);
    if let Some(filter) = &options.filter {
        if !filter.is_empty() {
            pipeline.push(doc! { "$match": filter.clone() });
        }
    }
    pipeline.push(doc! { "$sample": { "size": options.size as i64 } });
    if let Some(projection) = &options.projection {
        if !projection.is_empty() {
            pipeline.push(doc! { "$project": projection.clone() });
        }
    }
    pipeline
}

/// Whether a server rejected the `$sample` stage itself, as opposed to
/// failing the aggregation for an unrelated reason.
pub(crate) fn rejects_sample_stage(error: &mongodb::error::Error) -> bool {
    let message = error.to_string();
    message.contains("$sample") && message.to_lowercase().contains("unrecognized")
}

/// Reservoir-samples up to `size` documents from an already-loaded set, for
/// servers without `$sample` support. Order of the result is not meaningful.
pub(crate) fn reservoir_sample(documents: Vec<Document>, size: u64) -> Vec<Document> {
    if documents.len() as u64 <= size {
        return documents;
    }
    documents.into_iter().choose_multiple(&mut rand::rng(), size as usize)
}

/// A stream of sampled documents, either driven by a live aggregation cursor
/// or replaying a reservoir-sampled buffer.
pub enum SampleStream {
    Cursor(Cursor<Document>),
    Loaded(std::vec::IntoIter<Document>),
}

impl SampleStream {
    pub(crate) fn loaded(documents: Vec<Document>) -> Self {
        Self::Loaded(documents.into_iter())
    }
}

impl Stream for SampleStream {
    type Item = Result<Document>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.get_mut() {
            Self::Cursor(cursor) => Pin::new(cursor)
                .poll_next(cx)
                .map(|next| next.map(|document| document.map_err(DataServiceError::from_driver))),
            Self::Loaded(documents) => Poll::Ready(documents.next().map(Ok)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use mongodb::error::Error as DriverError;

    #[test]
    fn default_pipeline_is_a_bare_sample_stage() {
        let pipeline = sample_pipeline(&SampleOptions::default());
        assert_eq!(pipeline, vec![doc! { "$sample": { "size": 1000i64 } }]);
    }

    #[test]
    fn match_precedes_sample_and_project_follows() {
        let options = SampleOptions {
            size: 25,
            filter: Some(doc! { "status": "active" }),
            projection: Some(doc! { "name": 1 }),
        };
        let pipeline = sample_pipeline(&options);
        assert_eq!(
            pipeline,
            vec![
                doc! { "$match": { "status": "active" } },
                doc! { "$sample": { "size": 25i64 } },
                doc! { "$project": { "name": 1 } },
            ]
        );
    }

    #[test]
    fn empty_filter_and_projection_are_omitted() {
        let options = SampleOptions {
            size: 5,
            filter: Some(Document::new()),
            projection: Some(Document::new()),
        };
        let pipeline = sample_pipeline(&options);
        assert_eq!(pipeline, vec![doc! { "$sample": { "size": 5i64 } }]);
    }

    fn driver_error(message: &str) -> DriverError {
        DriverError::from(std::io::Error::other(message.to_string()))
    }

    #[test]
    fn sample_stage_rejection_is_recognized() {
        let error = driver_error("Unrecognized pipeline stage name: '$sample'");
        assert!(rejects_sample_stage(&error));
        assert!(!rejects_sample_stage(&driver_error("$sample size must be positive")));
        assert!(!rejects_sample_stage(&driver_error("network failure")));
    }

    #[test]
    fn reservoir_keeps_everything_when_under_size() {
        let documents = vec![doc! { "n": 1 }, doc! { "n": 2 }];
        let sampled = reservoir_sample(documents.clone(), 10);
        assert_eq!(sampled, documents);
    }

    #[test]
    fn reservoir_caps_at_requested_size() {
        let documents: Vec<Document> = (0..100).map(|n| doc! { "n": n }).collect();
        let sampled = reservoir_sample(documents, 7);
        assert_eq!(sampled.len(), 7);
    }

    #[test]
    fn loaded_stream_yields_each_document_once() {
        let stream = SampleStream::loaded(vec![doc! { "n": 1 }, doc! { "n": 2 }]);
        let documents: Vec<_> = futures::executor::block_on(stream.collect::<Vec<_>>());
        assert_eq!(documents.len(), 2);
        assert_eq!(documents[0].as_ref().unwrap(), &doc! { "n": 1 });
        assert_eq!(documents[1].as_ref().unwrap(), &doc! { "n": 2 });
    }
}
