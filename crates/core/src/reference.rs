//! Storage references embedded in database columns.
//!
//! Columns such as `dogs.dog_picture` hold either a full public URL
//! (`https://host/storage/v1/object/public/dog-avatars/<id>/a.jpg`) or the
//! relative form starting at the public marker. Both resolve to the same
//! [`StorageReference`].

use crate::config::BucketConfig;
use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// A `(bucket, path)` pair addressing one object in blob storage.
///
/// `path` is always stored percent-decoded, so two references are equal
/// exactly when they address the same object.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StorageReference {
    pub bucket: String,
    pub path: String,
}

impl StorageReference {
    pub fn new(bucket: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            path: path.into(),
        }
    }

    /// Composite `"{bucket}/{path}"` key used for set membership.
    pub fn key(&self) -> String {
        composite_key(&self.bucket, &self.path)
    }
}

impl fmt::Display for StorageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.path)
    }
}

/// Build the composite key for a bucket and an object name.
pub fn composite_key(bucket: &str, path: &str) -> String {
    let mut key = String::with_capacity(bucket.len() + path.len() + 1);
    key.push_str(bucket);
    key.push('/');
    key.push_str(path);
    key
}

/// Parses stored URLs or paths into [`StorageReference`]s.
///
/// Holds the public URL marker and the allow-list of known buckets. The
/// extractor is immutable and cheap to clone; construct a custom one in
/// tests to exercise other bucket sets.
#[derive(Clone, Debug)]
pub struct ReferenceExtractor {
    marker: String,
    buckets: Vec<String>,
}

impl ReferenceExtractor {
    pub fn new(marker: impl Into<String>, buckets: impl IntoIterator<Item = String>) -> Self {
        Self {
            marker: marker.into(),
            buckets: buckets.into_iter().collect(),
        }
    }

    /// Build the extractor for the configured avatar and update buckets.
    pub fn from_config(config: &BucketConfig) -> Self {
        Self::new(
            config.public_url_marker.clone(),
            [config.avatars.clone(), config.updates.clone()],
        )
    }

    /// Buckets a reference may point into.
    pub fn known_buckets(&self) -> &[String] {
        &self.buckets
    }

    pub fn is_known_bucket(&self, bucket: &str) -> bool {
        self.buckets.iter().any(|b| b == bucket)
    }

    /// Extract a reference from a raw column value.
    ///
    /// Never fails: empty input, input without the public marker, malformed
    /// URLs, unknown buckets and empty paths all yield `None`.
    pub fn extract(&self, raw: Option<&str>) -> Option<StorageReference> {
        let raw = raw?.trim();
        if raw.is_empty() {
            return None;
        }

        let remainder = match raw.strip_prefix(self.marker.as_str()) {
            Some(rest) => strip_query_and_fragment(rest).to_string(),
            None => {
                let url = Url::parse(raw).ok()?;
                let path = url.path();
                let start = path.find(self.marker.as_str())? + self.marker.len();
                path[start..].to_string()
            }
        };

        let (bucket, encoded_path) = remainder.split_once('/')?;
        if !self.is_known_bucket(bucket) {
            return None;
        }

        let path = percent_decode_str(encoded_path).decode_utf8().ok()?;
        if path.is_empty() {
            return None;
        }

        Some(StorageReference::new(bucket, path.into_owned()))
    }

    /// Extract and return the composite key directly.
    pub fn extract_key(&self, raw: Option<&str>) -> Option<String> {
        self.extract(raw).map(|r| r.key())
    }
}

impl Default for ReferenceExtractor {
    fn default() -> Self {
        Self::from_config(&BucketConfig::default())
    }
}

fn strip_query_and_fragment(s: &str) -> &str {
    match s.find(['?', '#']) {
        Some(idx) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const HOST: &str = "https://project.supabase.co";

    fn extractor() -> ReferenceExtractor {
        ReferenceExtractor::default()
    }

    #[test]
    fn test_extract_relative_form() {
        let r = extractor()
            .extract(Some("/storage/v1/object/public/dog-avatars/abc/1.jpg"))
            .unwrap();
        assert_eq!(r, StorageReference::new("dog-avatars", "abc/1.jpg"));
        assert_eq!(r.key(), "dog-avatars/abc/1.jpg");
    }

    #[test]
    fn test_extract_absolute_url() {
        let raw = format!("{HOST}/storage/v1/object/public/dog-updates/abc/clip.mp4");
        let r = extractor().extract(Some(raw.as_str())).unwrap();
        assert_eq!(r, StorageReference::new("dog-updates", "abc/clip.mp4"));
    }

    #[test]
    fn test_absolute_and_relative_forms_are_equal() {
        let ex = extractor();
        let a = ex.extract(Some("/storage/v1/object/public/dog-avatars/x/my%20dog.jpg"));
        let b = ex.extract(Some(&*format!(
            "{HOST}/storage/v1/object/public/dog-avatars/x/my dog.jpg"
        )));
        let c = ex.extract(Some("/storage/v1/object/public/dog-avatars/x/my dog.jpg"));
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(a.unwrap().path, "x/my dog.jpg");
    }

    #[test]
    fn test_query_and_fragment_are_ignored() {
        let ex = extractor();
        let expected = Some(StorageReference::new("dog-avatars", "x/1.jpg"));
        assert_eq!(
            ex.extract(Some("/storage/v1/object/public/dog-avatars/x/1.jpg?t=123")),
            expected
        );
        assert_eq!(
            ex.extract(Some(&*format!(
                "{HOST}/storage/v1/object/public/dog-avatars/x/1.jpg?width=200#top"
            ))),
            expected
        );
    }

    #[test]
    fn test_unknown_bucket_is_not_a_reference() {
        let ex = extractor();
        assert!(
            ex.extract(Some("/storage/v1/object/public/other-bucket/x/1.jpg"))
                .is_none()
        );
        assert!(
            ex.extract(Some(&*format!(
                "{HOST}/storage/v1/object/public/cat-avatars/x/1.jpg"
            )))
            .is_none()
        );
    }

    #[test]
    fn test_non_references_yield_none() {
        let ex = extractor();
        for raw in [
            "",
            "   ",
            "x/1.jpg",
            "dog-avatars/x/1.jpg",
            "https://example.com/images/dog.jpg",
            "/storage/v1/object/public/",
            "/storage/v1/object/public/dog-avatars",
            "/storage/v1/object/public/dog-avatars/",
            "http://[::1",
            "not a url at all",
        ] {
            assert!(ex.extract(Some(raw)).is_none(), "extracted from {raw:?}");
        }
        assert!(ex.extract(None).is_none());
    }

    #[test]
    fn test_invalid_utf8_escape_yields_none() {
        assert!(
            extractor()
                .extract(Some("/storage/v1/object/public/dog-avatars/x/%FF%FE.jpg"))
                .is_none()
        );
    }

    #[test]
    fn test_custom_bucket_set() {
        let ex = ReferenceExtractor::new("/public/", ["media".to_string()]);
        assert_eq!(
            ex.extract(Some("/public/media/a/b.png")),
            Some(StorageReference::new("media", "a/b.png"))
        );
        assert!(ex.extract(Some("/public/dog-avatars/a/b.png")).is_none());
        assert!(ex.is_known_bucket("media"));
        assert!(!ex.is_known_bucket("dog-avatars"));
    }

    fn segment() -> impl Strategy<Value = String> {
        "[A-Za-z0-9_-][A-Za-z0-9._-]{0,11}".prop_filter("dot segments", |s| s != "." && s != "..")
    }

    fn object_path() -> impl Strategy<Value = String> {
        prop::collection::vec(segment(), 1..4).prop_map(|segs| segs.join("/"))
    }

    proptest! {
        #[test]
        fn prop_known_bucket_roundtrips(
            bucket in prop::sample::select(vec!["dog-avatars", "dog-updates"]),
            path in object_path(),
        ) {
            let ex = extractor();
            let expected = Some(StorageReference::new(bucket, path.clone()));
            let relative = format!("/storage/v1/object/public/{bucket}/{path}");
            let absolute = format!("{HOST}{relative}");
            prop_assert_eq!(ex.extract(Some(relative.as_str())), expected.clone());
            prop_assert_eq!(ex.extract(Some(absolute.as_str())), expected);
        }

        #[test]
        fn prop_unknown_bucket_never_extracts(
            bucket in "[a-z]{1,12}",
            path in object_path(),
        ) {
            let relative = format!("/storage/v1/object/public/{bucket}/{path}");
            prop_assert!(extractor().extract(Some(relative.as_str())).is_none());
        }

        #[test]
        fn prop_extract_never_panics(raw in ".*") {
            let _ = extractor().extract(Some(raw.as_str()));
        }
    }
}
