//! Streaming of word counts as CSV downloads

use crate::wordcount::WordCountRow;
use axum::{
    body::Body,
    http::header::{CONTENT_DISPOSITION, CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use csv_async::AsyncWriterBuilder;
use tokio::io::AsyncWrite;
use tokio_util::io::ReaderStream;

/// Columns of word count downloads
pub const COLUMNS: [&str; 5] = ["term", "stem", "count", "sample_size", "ratio"];

/// Amount of CSV data that can be buffered before the client reads it
const PIPE_CAPACITY: usize = 64 * 1024;

/// Stream word counts as a CSV attachment named `<filename>.csv`
///
/// Rows are serialized by a background task as the client reads them.
pub fn stream_response(rows: Vec<WordCountRow>, filename: &str) -> Response {
    let (writer, reader) = tokio::io::duplex(PIPE_CAPACITY);
    tokio::spawn(async move {
        let num_rows = rows.len();
        match write_rows(writer, &rows).await {
            Ok(()) => log::debug!("Streamed {num_rows} CSV rows"),
            Err(e) => log::warn!("Aborted CSV download: {e}"),
        }
    });
    (
        [
            (CONTENT_TYPE, "text/csv; charset=utf-8".to_owned()),
            (
                CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}.csv\""),
            ),
        ],
        Body::from_stream(ReaderStream::new(reader)),
    )
        .into_response()
}

/// Write a header line, then one line per word count
async fn write_rows(writer: impl AsyncWrite + Unpin, rows: &[WordCountRow]) -> csv_async::Result<()> {
    let mut csv = AsyncWriterBuilder::new()
        .has_headers(false)
        .create_serializer(writer);
    csv.serialize(COLUMNS).await?;
    for row in rows {
        csv.serialize((&row.term, &row.stem, row.count, row.sample_size, row.ratio))
            .await?;
    }
    csv.flush().await?;
    Ok(())
}
