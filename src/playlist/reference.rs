use regex::Regex;
use std::ops::Range;
use std::sync::LazyLock;

/// `path.ext[?query]`: anything a playlist line can point at, relative or
/// absolute, with an optional query string carried along.
static MEDIA_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([^\s"']+\.(ts|m3u8))(\?[^"'\s]*)?"#).expect("reference pattern compiles")
});

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefKind {
    /// A media chunk; gets signed.
    Segment,
    /// A nested playlist; gets the forwarded parameters, signing deferred
    /// to the trusted-key mechanism at the edge unless configured otherwise.
    Manifest,
}

/// One reference found in a playlist document.
#[derive(Debug)]
pub struct MediaRef {
    /// Byte span of the whole match (path plus query) in the source text.
    pub span: Range<usize>,
    pub path: String,
    pub query: Option<String>,
    pub kind: RefKind,
}

/// Request-scoped resolution context for relative references.
#[derive(Debug)]
pub struct BaseContext {
    pub protocol: String,
    pub host: String,
    /// Directory part of the playlist's own storage key, no surrounding
    /// slashes; empty when the playlist sits at the bucket root.
    dir: String,
}

impl BaseContext {
    pub fn new(protocol: impl Into<String>, host: impl Into<String>, key: &str) -> Self {
        let key = key.trim_start_matches('/');
        let dir = key.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");

        BaseContext {
            protocol: protocol.into(),
            host: host.into(),
            dir: dir.to_string(),
        }
    }
}

impl MediaRef {
    pub fn is_absolute(&self) -> bool {
        self.path.starts_with("http://") || self.path.starts_with("https://")
    }

    /// Absolute form of this reference under the delivery host. Rooted
    /// paths skip the playlist's own directory, everything else resolves
    /// relative to it; already-absolute references pass through with their
    /// query intact.
    pub fn absolute_target(&self, base: &BaseContext) -> String {
        let query = self.query.as_deref().unwrap_or("");

        if self.is_absolute() {
            return format!("{}{query}", self.path);
        }

        if self.path.starts_with('/') {
            format!("{}://{}{}{query}", base.protocol, base.host, self.path)
        } else if base.dir.is_empty() {
            format!("{}://{}/{}{query}", base.protocol, base.host, self.path)
        } else {
            format!(
                "{}://{}/{}/{}{query}",
                base.protocol, base.host, base.dir, self.path
            )
        }
    }
}

/// Pass 1 of the rewrite: every reference in document order, spans intact.
pub fn scan(body: &str) -> Vec<MediaRef> {
    MEDIA_REF
        .captures_iter(body)
        .map(|caps| {
            let whole = caps.get(0).expect("capture 0 is the whole match");
            let kind = match caps.get(2).map(|m| m.as_str()) {
                Some("ts") => RefKind::Segment,
                _ => RefKind::Manifest,
            };

            MediaRef {
                span: whole.range(),
                path: caps[1].to_string(),
                query: caps.get(3).map(|m| m.as_str().to_string()),
                kind,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_references_in_document_order() {
        let body = "#EXTM3U\n#EXTINF:4.0,\nseg1.ts\nseg2.ts?x=1\nsub.m3u8\n";
        let refs = scan(body);

        assert_eq!(refs.len(), 3);
        assert_eq!(refs[0].path, "seg1.ts");
        assert_eq!(refs[0].kind, RefKind::Segment);
        assert_eq!(refs[0].query, None);
        assert_eq!(refs[1].path, "seg2.ts");
        assert_eq!(refs[1].query.as_deref(), Some("?x=1"));
        assert_eq!(refs[2].path, "sub.m3u8");
        assert_eq!(refs[2].kind, RefKind::Manifest);
    }

    #[test]
    fn spans_cover_path_and_query() {
        let body = "seg.ts?a=1\n";
        let refs = scan(body);
        assert_eq!(&body[refs[0].span.clone()], "seg.ts?a=1");
    }

    #[test]
    fn ignores_lines_without_media_extensions() {
        let body = "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:4\n";
        assert!(scan(body).is_empty());
    }

    #[test]
    fn detects_absolute_references() {
        let refs = scan("https://cdn.example/a.ts\n");
        assert!(refs[0].is_absolute());

        let refs = scan("show/a.ts\n");
        assert!(!refs[0].is_absolute());
    }

    #[test]
    fn resolves_relative_to_the_playlist_directory() {
        let base = BaseContext::new("https", "cdn.example", "show/master.m3u8");
        let refs = scan("seg1.ts\n");
        assert_eq!(
            refs[0].absolute_target(&base),
            "https://cdn.example/show/seg1.ts"
        );
    }

    #[test]
    fn resolves_at_the_bucket_root() {
        let base = BaseContext::new("https", "cdn.example", "master.m3u8");
        let refs = scan("seg1.ts\n");
        assert_eq!(refs[0].absolute_target(&base), "https://cdn.example/seg1.ts");
    }

    #[test]
    fn rooted_paths_skip_the_base_directory() {
        let base = BaseContext::new("https", "cdn.example", "show/master.m3u8");
        let refs = scan("/other/seg1.ts\n");
        assert_eq!(
            refs[0].absolute_target(&base),
            "https://cdn.example/other/seg1.ts"
        );
    }

    #[test]
    fn absolute_references_pass_through_with_query() {
        let base = BaseContext::new("https", "cdn.example", "show/master.m3u8");
        let refs = scan("https://media.example/a.ts?x=1\n");
        assert_eq!(
            refs[0].absolute_target(&base),
            "https://media.example/a.ts?x=1"
        );
    }

    #[test]
    fn relative_queries_are_kept() {
        let base = BaseContext::new("http", "cdn.example", "show/master.m3u8");
        let refs = scan("seg1.ts?v=2\n");
        assert_eq!(
            refs[0].absolute_target(&base),
            "http://cdn.example/show/seg1.ts?v=2"
        );
    }
}
