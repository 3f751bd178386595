//! Rendering of log records into output lines

use std::collections::HashMap;
use std::error::Error as _;
use std::fmt::{self, Write as _};
use std::str::FromStr;

use podtail_types::LogRecord;
use tera::{Context, Tera, Value};

use crate::color::{SGR_RESET, sgr_prefix};

const LINE: &str = "line";

/// Failure while rendering a single record
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("{0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Format(#[from] fmt::Error),

    #[error("{}", chain(.0))]
    Template(#[from] tera::Error),
}

/// Failure while building a template
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("{0}")]
    Invalid(String),

    #[error("unknown output format {0:?}, expected default, raw or json")]
    UnknownOutput(String),
}

/// Turns a log record into the text written to the output sink
pub trait Renderer: Send + Sync {
    fn render(&self, record: &LogRecord) -> Result<String, RenderError>;
}

/// Built-in output formats
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Template {
    /// `[namespace] pod container message`, names colored
    Default { namespace: bool },
    /// The message alone
    Raw,
    /// The record as a JSON object
    Json,
    Custom(CustomTemplate),
}

impl Template {
    /// Template for one of the `--output` names
    pub fn from_output(name: &str, namespace: bool) -> Result<Self, TemplateError> {
        match name {
            "default" => Ok(Self::Default { namespace }),
            "raw" => Ok(Self::Raw),
            "json" => Ok(Self::Json),
            other => Err(TemplateError::UnknownOutput(other.to_string())),
        }
    }
}

impl Renderer for Template {
    fn render(&self, record: &LogRecord) -> Result<String, RenderError> {
        let mut out = String::new();
        match self {
            Self::Default { namespace } => {
                if *namespace {
                    write!(out, "{} ", record.pod_color.apply(&record.namespace))?;
                }
                writeln!(
                    out,
                    "{} {} {}",
                    record.pod_color.apply(&record.pod_name),
                    record.container_color.apply(&record.container_name),
                    record.message
                )?;
            }
            Self::Raw => writeln!(out, "{}", record.message)?,
            Self::Json => {
                out = serde_json::to_string(record)?;
                out.push('\n');
            }
            Self::Custom(template) => return template.render(record),
        }
        Ok(out)
    }
}

/// User supplied tera template
///
/// Variables are the record fields `message`, `nodeName`, `namespace`,
/// `podName` and `containerName`, plus `podColor` and `containerColor` for
/// the `color` filter: `{{ podName | color(style=podColor) }}`. A trailing
/// newline is added when missing.
#[derive(Clone)]
pub struct CustomTemplate {
    source: String,
    tera: Tera,
}

impl FromStr for CustomTemplate {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |e: tera::Error| TemplateError::Invalid(chain(&e));

        let mut tera = Tera::default();
        tera.autoescape_on(vec![]);
        tera.register_filter("color", color);
        tera.add_raw_template(LINE, s).map_err(invalid)?;

        let template = Self {
            source: s.to_string(),
            tera,
        };
        // undefined variables only surface when rendering
        template.render(&LogRecord::default()).map_err(|e| match e {
            RenderError::Template(e) => invalid(e),
            other => TemplateError::Invalid(other.to_string()),
        })?;
        Ok(template)
    }
}

impl PartialEq for CustomTemplate {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for CustomTemplate {}

impl fmt::Debug for CustomTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CustomTemplate").field(&self.source).finish()
    }
}

impl Renderer for CustomTemplate {
    fn render(&self, record: &LogRecord) -> Result<String, RenderError> {
        let mut context = Context::from_serialize(record)?;
        context.insert("podColor", &sgr_prefix(&record.pod_color));
        context.insert("containerColor", &sgr_prefix(&record.container_color));

        let mut out = self.tera.render(LINE, &context)?;
        if !out.ends_with('\n') {
            out.push('\n');
        }
        Ok(out)
    }
}

/// `{{ text | color(style=podColor) }}` wraps the text in the style
fn color(value: &Value, args: &HashMap<String, Value>) -> tera::Result<Value> {
    let text = tera::try_get_value!("color", "value", String, value);
    let style = match args.get("style") {
        Some(style) => tera::try_get_value!("color", "style", String, style),
        None => return Err(tera::Error::msg("filter `color` expects a `style` argument")),
    };
    if style.is_empty() {
        return Ok(Value::String(text));
    }
    Ok(Value::String(format!("{style}{text}{SGR_RESET}")))
}

/// tera nests the useful detail in the error source
fn chain(err: &tera::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        write!(message, ": {cause}").ok();
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::style::{Color, ContentStyle};

    fn record() -> LogRecord {
        LogRecord {
            message: "hello".to_string(),
            node_name: "node1".to_string(),
            namespace: "ns1".to_string(),
            pod_name: "pod1".to_string(),
            container_name: "app".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_template() {
        let plain = Template::Default { namespace: false };
        assert_eq!(plain.render(&record()).unwrap(), "pod1 app hello\n");

        let with_ns = Template::Default { namespace: true };
        assert_eq!(with_ns.render(&record()).unwrap(), "ns1 pod1 app hello\n");
    }

    #[test]
    fn test_default_template_colors_names() {
        let mut rec = record();
        rec.pod_color.foreground_color = Some(Color::Cyan);
        let out = Template::Default { namespace: false }.render(&rec).unwrap();
        assert!(out.starts_with(&rec.pod_color.apply("pod1").to_string()));
        assert!(out.ends_with(" hello\n"));
    }

    #[test]
    fn test_raw_and_json() {
        assert_eq!(Template::Raw.render(&record()).unwrap(), "hello\n");

        let json = Template::Json.render(&record()).unwrap();
        assert!(json.ends_with('\n'));
        let value: serde_json::Value = serde_json::from_str(json.trim_end()).unwrap();
        assert_eq!(value["podName"], "pod1");
        assert_eq!(value["message"], "hello");
    }

    #[test]
    fn test_from_output() {
        assert_eq!(
            Template::from_output("default", true),
            Ok(Template::Default { namespace: true })
        );
        assert_eq!(Template::from_output("raw", false), Ok(Template::Raw));
        assert!(matches!(
            Template::from_output("yaml", false),
            Err(TemplateError::UnknownOutput(_))
        ));
    }

    #[test]
    fn test_custom_template_fields() {
        let template: CustomTemplate =
            "{{ namespace }}/{{ podName }}/{{ containerName }}@{{ nodeName }}: {{ message }}"
                .parse()
                .unwrap();
        assert_eq!(
            template.render(&record()).unwrap(),
            "ns1/pod1/app@node1: hello\n"
        );
    }

    #[test]
    fn test_custom_template_keeps_newline() {
        let template: CustomTemplate = "{{ podName }} {{ message }}\n".parse().unwrap();
        assert_eq!(template.render(&record()).unwrap(), "pod1 hello\n");
    }

    #[test]
    fn test_custom_template_does_not_escape() {
        let mut rec = record();
        rec.message = "<a href=\"x\">&</a>".to_string();
        let template: CustomTemplate = "{{ message }}".parse().unwrap();
        assert_eq!(template.render(&rec).unwrap(), "<a href=\"x\">&</a>\n");
    }

    #[test]
    fn test_custom_template_color() {
        let mut rec = record();
        rec.container_color = ContentStyle::new();
        rec.container_color.foreground_color = Some(Color::DarkGreen);
        let template: CustomTemplate = "{{ containerName | color(style=containerColor) }} {{ message }}"
            .parse()
            .unwrap();
        let expected = format!(
            "{}app{SGR_RESET} hello\n",
            sgr_prefix(&rec.container_color)
        );
        assert_eq!(template.render(&rec).unwrap(), expected);
    }

    #[test]
    fn test_custom_template_color_without_style_is_plain() {
        let template: CustomTemplate = "{{ podName | color(style=podColor) }}".parse().unwrap();
        assert_eq!(template.render(&record()).unwrap(), "pod1\n");
    }

    #[test]
    fn test_custom_template_errors() {
        assert!(matches!(
            "{{ labels }}".parse::<CustomTemplate>(),
            Err(TemplateError::Invalid(_))
        ));
        assert!(matches!(
            "{{ podName".parse::<CustomTemplate>(),
            Err(TemplateError::Invalid(_))
        ));
        assert!(matches!(
            "{{ podName | color }}".parse::<CustomTemplate>(),
            Err(TemplateError::Invalid(e)) if e.contains("style")
        ));
    }
}
