//! Per-part conversion to PDF.
//!
//! Parts are visited in document order. Each accepted part yields at most one
//! PDF in the workspace; the resulting list is the fax's page order.

use std::path::PathBuf;

use crate::config::{ConversionFailurePolicy, ConverterCommands, GatewayConfig};
use crate::convert::classify::{ImageFormat, PartKind, classify};
use crate::convert::command::{CommandTemplate, Converter};
use crate::convert::text::{inject_meta_charset, markdown_document, to_utf8};
use crate::error::ConvertError;
use crate::mail::message::ContentPart;
use crate::options::TextMode;
use crate::workspace::Workspace;

/// How an accepted part becomes a PDF.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    /// Already a PDF; written as-is.
    Verbatim,
    Image(ImageFormat),
    PlainText,
    Markdown,
    Html,
}

/// Pick the route for `kind` under `mode`, or `None` when the part is not in
/// the allow-set.
fn route(kind: &PartKind, mode: TextMode) -> Option<Route> {
    if !kind.is_accepted(mode) {
        return None;
    }
    match (kind, mode) {
        (PartKind::Pdf, _) => Some(Route::Verbatim),
        (PartKind::Image(format), _) => Some(Route::Image(*format)),
        (PartKind::PlainText, TextMode::Plain) => Some(Route::PlainText),
        (PartKind::PlainText, TextMode::Markdown) => Some(Route::Markdown),
        (PartKind::Html, TextMode::Html) => Some(Route::Html),
        _ => None,
    }
}

pub struct ConverterDispatcher<'a> {
    converter: &'a dyn Converter,
    commands: &'a ConverterCommands,
    dpi: String,
    policy: ConversionFailurePolicy,
}

impl<'a> ConverterDispatcher<'a> {
    pub fn new(converter: &'a dyn Converter, config: &'a GatewayConfig) -> Self {
        Self {
            converter,
            commands: &config.commands,
            dpi: config.dpi.to_string(),
            policy: config.on_convert_failure,
        }
    }

    /// Convert every accepted part of `parts` into a PDF in `workspace`.
    ///
    /// Only the first text part matching `mode` is attempted; later ones are
    /// skipped even when that attempt failed. A failed part is dropped under
    /// [`ConversionFailurePolicy::Skip`] and ends the run under `Abort`.
    pub async fn dispatch(
        &self,
        parts: &[ContentPart],
        mode: TextMode,
        workspace: &mut Workspace,
    ) -> Result<Vec<PathBuf>, ConvertError> {
        let mut pdfs = Vec::new();
        let mut text_attempted = false;

        for (index, part) in parts.iter().enumerate() {
            let kind = classify(part);
            let Some(route) = route(&kind, mode) else {
                tracing::debug!(part = index, kind = kind.label(), "Part not accepted, skipping");
                continue;
            };

            if kind.is_text() {
                if text_attempted {
                    tracing::debug!(part = index, kind = kind.label(), "Text part already used, skipping");
                    continue;
                }
                text_attempted = true;
            }

            tracing::debug!(part = index, kind = kind.label(), ?route, "Converting part");

            match self.convert(index, part, route, workspace).await {
                Ok(pdf) => pdfs.push(pdf),
                Err(e) => match self.policy {
                    ConversionFailurePolicy::Skip => {
                        tracing::warn!(part = index, kind = kind.label(), error = %e, "Part conversion failed, skipping");
                    }
                    ConversionFailurePolicy::Abort => return Err(e),
                },
            }
        }

        Ok(pdfs)
    }

    async fn convert(
        &self,
        index: usize,
        part: &ContentPart,
        route: Route,
        workspace: &mut Workspace,
    ) -> Result<PathBuf, ConvertError> {
        let output_suffix = format!("{index}.pdf");

        let (input, template, params): (PathBuf, &CommandTemplate, Vec<(&str, &str)>) = match route {
            Route::Verbatim => {
                return Ok(workspace.write(&output_suffix, &part.payload).await?);
            }
            Route::Image(format) => {
                let input = workspace
                    .write(&format!("{index}.{}", format.extension()), &part.payload)
                    .await?;
                (input, &self.commands.image_to_pdf, vec![("dpi", self.dpi.as_str())])
            }
            Route::PlainText => {
                let text = to_utf8(&part.payload, part.charset.as_deref());
                let input = workspace.write(&format!("{index}.txt"), text.as_bytes()).await?;
                (
                    input,
                    &self.commands.text_to_pdf,
                    vec![("dpi", self.dpi.as_str()), ("encoding", "utf-8")],
                )
            }
            Route::Markdown => {
                let text = to_utf8(&part.payload, part.charset.as_deref());
                let html = markdown_document(&text);
                let input = workspace.write(&format!("{index}.html"), html.as_bytes()).await?;
                (input, &self.commands.html_to_pdf, vec![("dpi", self.dpi.as_str())])
            }
            Route::Html => {
                let text = to_utf8(&part.payload, part.charset.as_deref());
                let html = inject_meta_charset(&text);
                let input = workspace.write(&format!("{index}.html"), html.as_bytes()).await?;
                (input, &self.commands.html_to_pdf, vec![("dpi", self.dpi.as_str())])
            }
        };

        let output = workspace.resolve_path(&output_suffix);
        workspace.track(output.clone());
        let job = template.job(vec![input], output.clone(), &params);
        self.converter.run(&job).await?;
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::convert::command::ConversionJob;
    use crate::workspace::InvocationId;

    /// Writes a fake PDF for every job, failing for programs in `broken`.
    #[derive(Default)]
    struct FakeConverter {
        jobs: Mutex<Vec<ConversionJob>>,
        broken: Vec<&'static str>,
    }

    #[async_trait]
    impl Converter for FakeConverter {
        async fn run(&self, job: &ConversionJob) -> Result<(), ConvertError> {
            self.jobs.lock().unwrap().push(job.clone());
            if self.broken.iter().any(|b| *b == job.program()) {
                return Err(ConvertError::Failed {
                    program: job.program().to_string(),
                    status: "exit status: 1".into(),
                    stderr: "boom".into(),
                });
            }
            tokio::fs::write(&job.output, b"%PDF-fake").await?;
            Ok(())
        }
    }

    fn config() -> GatewayConfig {
        let mut config = GatewayConfig::default();
        config.commands.image_to_pdf = CommandTemplate::new(["img2pdf", "{input}", "{output}"]);
        config.commands.text_to_pdf =
            CommandTemplate::new(["txt2pdf", "--dpi", "{dpi}", "--encoding", "{encoding}", "{input}", "{output}"]);
        config.commands.html_to_pdf = CommandTemplate::new(["html2pdf", "{input}", "{output}"]);
        config
    }

    fn workspace(dir: &tempfile::TempDir) -> Workspace {
        Workspace::with_id(dir.path().to_path_buf(), InvocationId::new())
    }

    #[test]
    fn route_table() {
        assert_eq!(route(&PartKind::Pdf, TextMode::None), Some(Route::Verbatim));
        assert_eq!(route(&PartKind::PlainText, TextMode::None), None);
        assert_eq!(route(&PartKind::PlainText, TextMode::Plain), Some(Route::PlainText));
        assert_eq!(route(&PartKind::PlainText, TextMode::Markdown), Some(Route::Markdown));
        assert_eq!(route(&PartKind::Html, TextMode::Plain), None);
        assert_eq!(route(&PartKind::Html, TextMode::Html), Some(Route::Html));
        assert_eq!(route(&PartKind::Unsupported("application/zip".into()), TextMode::Html), None);
    }

    #[tokio::test]
    async fn pages_follow_document_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut ws = workspace(&dir);
        let converter = FakeConverter::default();
        let config = config();
        let parts = vec![
            ContentPart::new("image/png", b"png".to_vec()),
            ContentPart::new("application/zip", b"zip".to_vec()),
            ContentPart::new("application/pdf", b"%PDF-1.4".to_vec()),
        ];

        let pdfs = ConverterDispatcher::new(&converter, &config)
            .dispatch(&parts, TextMode::None, &mut ws)
            .await
            .unwrap();

        assert_eq!(pdfs, vec![ws.resolve_path("0.pdf"), ws.resolve_path("2.pdf")]);
        assert_eq!(std::fs::read(&pdfs[1]).unwrap(), b"%PDF-1.4");
        let jobs = converter.jobs.lock().unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].inputs, vec![ws.resolve_path("0.png")]);
    }

    #[tokio::test]
    async fn only_first_text_part_is_used() {
        let dir = tempfile::tempdir().unwrap();
        let mut ws = workspace(&dir);
        let converter = FakeConverter::default();
        let config = config();
        let parts = vec![
            ContentPart::new("text/plain", "first".as_bytes()).with_charset("utf-8"),
            ContentPart::new("text/plain", "second".as_bytes()).with_charset("utf-8"),
        ];

        let pdfs = ConverterDispatcher::new(&converter, &config)
            .dispatch(&parts, TextMode::Plain, &mut ws)
            .await
            .unwrap();

        assert_eq!(pdfs.len(), 1);
        let jobs = converter.jobs.lock().unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(
            jobs[0].command[1..5],
            ["--dpi".to_string(), "200".into(), "--encoding".into(), "utf-8".into()]
        );
        assert_eq!(std::fs::read_to_string(&jobs[0].inputs[0]).unwrap(), "first");
    }

    #[tokio::test]
    async fn failed_text_attempt_still_counts() {
        let dir = tempfile::tempdir().unwrap();
        let mut ws = workspace(&dir);
        let converter = FakeConverter {
            broken: vec!["html2pdf"],
            ..Default::default()
        };
        let config = config();
        let parts = vec![
            ContentPart::new("text/html", "<p>a</p>".as_bytes()),
            ContentPart::new("text/html", "<p>b</p>".as_bytes()),
        ];

        let pdfs = ConverterDispatcher::new(&converter, &config)
            .dispatch(&parts, TextMode::Html, &mut ws)
            .await
            .unwrap();

        assert!(pdfs.is_empty());
        assert_eq!(converter.jobs.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn markdown_and_html_get_utf8_documents() {
        let dir = tempfile::tempdir().unwrap();
        let converter = FakeConverter::default();
        let config = config();

        let mut ws = workspace(&dir);
        let md = vec![ContentPart::new("text/plain", b"# caf\xe9".to_vec()).with_charset("iso-8859-1")];
        ConverterDispatcher::new(&converter, &config)
            .dispatch(&md, TextMode::Markdown, &mut ws)
            .await
            .unwrap();

        let mut ws = workspace(&dir);
        let html = vec![ContentPart::new("text/html", "<html><head></head><body>x</body></html>".as_bytes())];
        ConverterDispatcher::new(&converter, &config)
            .dispatch(&html, TextMode::Html, &mut ws)
            .await
            .unwrap();

        let jobs = converter.jobs.lock().unwrap();
        let rendered = std::fs::read_to_string(&jobs[0].inputs[0]).unwrap();
        assert!(rendered.contains("<h1>caf\u{e9}</h1>"));
        assert!(rendered.contains(r#"<meta charset="utf-8">"#));
        let injected = std::fs::read_to_string(&jobs[1].inputs[0]).unwrap();
        assert_eq!(
            injected,
            r#"<html><head><meta charset="utf-8"></head><body>x</body></html>"#
        );
    }

    #[tokio::test]
    async fn skip_policy_drops_failed_part() {
        let dir = tempfile::tempdir().unwrap();
        let mut ws = workspace(&dir);
        let converter = FakeConverter {
            broken: vec!["img2pdf"],
            ..Default::default()
        };
        let config = config();
        let parts = vec![
            ContentPart::new("image/tiff", b"II*".to_vec()),
            ContentPart::new("application/pdf", b"%PDF".to_vec()),
        ];

        let pdfs = ConverterDispatcher::new(&converter, &config)
            .dispatch(&parts, TextMode::None, &mut ws)
            .await
            .unwrap();
        assert_eq!(pdfs, vec![ws.resolve_path("1.pdf")]);
    }

    #[tokio::test]
    async fn abort_policy_fails_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let mut ws = workspace(&dir);
        let converter = FakeConverter {
            broken: vec!["img2pdf"],
            ..Default::default()
        };
        let mut config = config();
        config.on_convert_failure = ConversionFailurePolicy::Abort;
        let parts = vec![ContentPart::new("image/jpeg", b"jpg".to_vec())];

        let result = ConverterDispatcher::new(&converter, &config)
            .dispatch(&parts, TextMode::None, &mut ws)
            .await;
        assert!(matches!(result, Err(ConvertError::Failed { .. })));
    }
}
