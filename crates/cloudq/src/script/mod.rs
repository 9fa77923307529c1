//! Job script materialization: rewriting the scheduler resource directive of
//! a job-script template according to the computed node plan, then
//! substituting user-supplied parameters.

use handlebars::Handlebars;
use nom::bytes::complete::{tag, take_until};
use nom::sequence::delimited;

use crate::common::parser::NomResult;
use crate::{Error, Map};
use crate::capacity::NodePlan;

/// Per-application choice of parameter substitution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TemplateMode {
    /// Every `%name%` occurrence is replaced by the string form of the
    /// value; missing values become empty strings.
    #[default]
    Token,
    /// The whole value map is handed to the template renderer.
    Full,
}

/// Submission context required before any script is produced.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaterializeContext<'a> {
    pub queue: Option<&'a str>,
    pub project: Option<&'a str>,
}

const SELECT_DIRECTIVE_PREFIX: &str = "#PBS -l select=";
const DIRECTIVE_MARKER: &str = "# resource directive generated from the job request";

/// Produces the final script text for submission.
///
/// The resource directive is rewritten (or injected) exactly once before the
/// chosen substitution step runs. On any failure no partial script is
/// produced.
pub fn materialize_script(
    template: Option<&str>,
    plan: &NodePlan,
    ctx: &MaterializeContext,
    values: &Map<String, String>,
    mode: TemplateMode,
) -> crate::Result<String> {
    if ctx.queue.is_none() {
        return Err(Error::InvalidParams(
            "cannot materialize job script without a target queue".to_string(),
        ));
    }
    if ctx.project.is_none() {
        return Err(Error::InvalidParams(
            "cannot materialize job script without a project".to_string(),
        ));
    }
    let template = template.ok_or_else(|| {
        Error::JobScriptNotFound("application has no job script template configured".to_string())
    })?;
    if plan.nodes == 0 || plan.cpus_per_instance == 0 {
        return Err(Error::InvalidParams(
            "node plan resolves to zero capacity".to_string(),
        ));
    }

    let script = inject_resource_directive(template, plan);
    let script = match mode {
        TemplateMode::Token => replace_tokens(&script, values),
        TemplateMode::Full => {
            let mut handlebars = Handlebars::new();
            handlebars.set_strict_mode(false);
            handlebars
                .render_template(&script, values)
                .map_err(|e| Error::SubmitJobFailed(format!("template rendering failed: {e}")))?
        }
    };
    if script.trim().is_empty() {
        return Err(Error::SubmitJobFailed(
            "materialization produced an empty job script".to_string(),
        ));
    }
    Ok(script)
}

/// Replaces the first scheduler select line with one computed from the plan,
/// or injects a computed one (after the shebang when present) if the
/// template has none.
fn inject_resource_directive(template: &str, plan: &NodePlan) -> String {
    let directive = format!(
        "{SELECT_DIRECTIVE_PREFIX}{}:ncpus={}",
        plan.nodes, plan.cpus_per_instance
    );

    let mut lines: Vec<&str> = template.split('\n').collect();
    if let Some(position) = lines
        .iter()
        .position(|line| line.trim_start().starts_with(SELECT_DIRECTIVE_PREFIX))
    {
        lines[position] = &directive;
        return lines.join("\n");
    }

    let insert_at = match lines.first() {
        Some(first) if first.starts_with("#!") => 1,
        _ => 0,
    };
    lines.insert(insert_at, DIRECTIVE_MARKER);
    lines.insert(insert_at, &directive);
    lines.join("\n")
}

#[derive(Debug, Eq, PartialEq)]
enum StringPart<'a> {
    Verbatim(&'a str),
    Token(&'a str),
}

fn parse_token(data: &str) -> NomResult<&str> {
    delimited(tag("%"), take_until("%"), tag("%"))(data)
}

/// Splits a template into verbatim pieces and `%name%` tokens.
fn parse_template_string(data: &str) -> Vec<StringPart> {
    let mut parts = vec![];
    let mut start = 0;
    let mut input = data;

    // Jump between `%` candidates so the scan only lands on char boundaries
    while let Some(offset) = input[start..].find('%') {
        start += offset;
        match parse_token(&input[start..]) {
            Ok((rest, token)) => {
                if start > 0 {
                    parts.push(StringPart::Verbatim(&input[..start]));
                }
                input = rest;
                parts.push(StringPart::Token(token));
                start = 0;
            }
            Err(_) => {
                // A lone percent sign, not a token
                start += '%'.len_utf8();
            }
        }
    }

    if !input.is_empty() {
        parts.push(StringPart::Verbatim(input));
    }

    parts
}

fn replace_tokens(template: &str, values: &Map<String, String>) -> String {
    let mut buffer = String::with_capacity(template.len());
    for part in parse_template_string(template) {
        match part {
            StringPart::Verbatim(data) => buffer.push_str(data),
            StringPart::Token(name) => match values.get(name) {
                Some(value) => buffer.push_str(value),
                None => {
                    // Required fields are the job form's responsibility;
                    // an unknown token renders as nothing.
                    log::warn!("Encountered an unknown token `%{name}%` in the job script");
                }
            },
        }
    }
    buffer
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(nodes: u32, cpus_per_instance: u32) -> NodePlan {
        NodePlan {
            nodes,
            cpus_per_instance,
        }
    }

    fn ctx<'a>() -> MaterializeContext<'a> {
        MaterializeContext {
            queue: Some("hpc-main"),
            project: Some("default"),
        }
    }

    #[test]
    fn select_line_is_rewritten_in_place() {
        let template = "#!/bin/bash\n#PBS -l select=1:ncpus=4\necho hi";
        let script =
            materialize_script(Some(template), &plan(3, 8), &ctx(), &Map::new(), TemplateMode::Token)
                .unwrap();
        assert_eq!(script, "#!/bin/bash\n#PBS -l select=3:ncpus=8\necho hi");
    }

    #[test]
    fn materialization_is_idempotent() {
        let template = "#!/bin/bash\n#PBS -l select=1:ncpus=4\necho hi";
        let once =
            materialize_script(Some(template), &plan(3, 8), &ctx(), &Map::new(), TemplateMode::Token)
                .unwrap();
        let twice =
            materialize_script(Some(&once), &plan(3, 8), &ctx(), &Map::new(), TemplateMode::Token)
                .unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn missing_directive_is_injected_after_shebang() {
        let template = "#!/bin/bash\necho hi";
        let script =
            materialize_script(Some(template), &plan(2, 16), &ctx(), &Map::new(), TemplateMode::Token)
                .unwrap();
        let lines: Vec<&str> = script.split('\n').collect();
        assert_eq!(lines[0], "#!/bin/bash");
        assert_eq!(lines[1], "#PBS -l select=2:ncpus=16");
        assert_eq!(lines[2], DIRECTIVE_MARKER);
        assert_eq!(lines[3], "echo hi");
    }

    #[test]
    fn missing_directive_without_shebang_goes_first() {
        let template = "echo hi";
        let script =
            materialize_script(Some(template), &plan(1, 4), &ctx(), &Map::new(), TemplateMode::Token)
                .unwrap();
        let lines: Vec<&str> = script.split('\n').collect();
        assert_eq!(lines[0], "#PBS -l select=1:ncpus=4");
        assert_eq!(lines[1], DIRECTIVE_MARKER);
        assert_eq!(lines[2], "echo hi");
    }

    #[test]
    fn token_mode_substitutes_values() {
        let mut values = Map::new();
        values.insert("job_name".to_string(), "simulation".to_string());
        let template = "#!/bin/bash\n#PBS -N %job_name%\necho %job_name% %missing%";
        let script =
            materialize_script(Some(template), &plan(1, 4), &ctx(), &values, TemplateMode::Token)
                .unwrap();
        assert!(script.contains("#PBS -N simulation"));
        // missing values become empty strings, not errors
        assert!(script.contains("echo simulation \n") || script.ends_with("echo simulation "));
    }

    #[test]
    fn full_mode_renders_with_template_language() {
        let mut values = Map::new();
        values.insert("job_name".to_string(), "simulation".to_string());
        let template = "#!/bin/bash\necho {{job_name}}";
        let script =
            materialize_script(Some(template), &plan(1, 4), &ctx(), &values, TemplateMode::Full)
                .unwrap();
        assert!(script.contains("echo simulation"));
    }

    #[test]
    fn missing_queue_fails_without_partial_output() {
        let context = MaterializeContext {
            queue: None,
            project: Some("default"),
        };
        let result = materialize_script(
            Some("#!/bin/bash\necho hi"),
            &plan(1, 4),
            &context,
            &Map::new(),
            TemplateMode::Token,
        );
        assert!(matches!(result, Err(Error::InvalidParams(_))));
    }

    #[test]
    fn missing_template_is_a_distinct_error() {
        let result =
            materialize_script(None, &plan(1, 4), &ctx(), &Map::new(), TemplateMode::Token);
        assert!(matches!(result, Err(Error::JobScriptNotFound(_))));
    }

    #[test]
    fn zero_node_plan_blocks_generation() {
        let result = materialize_script(
            Some("#!/bin/bash\necho hi"),
            &plan(0, 4),
            &ctx(),
            &Map::new(),
            TemplateMode::Token,
        );
        assert!(matches!(result, Err(Error::InvalidParams(_))));
    }

    #[test]
    fn token_parser_handles_plain_percent() {
        assert_eq!(
            parse_template_string("100% done"),
            vec![StringPart::Verbatim("100% done")]
        );
    }

    #[test]
    fn token_scanner_handles_non_ascii_text() {
        let mut values = Map::new();
        values.insert("name".to_string(), "simulation".to_string());
        let template = "#!/bin/bash\n# résumé job\necho %name%";
        let script =
            materialize_script(Some(template), &plan(1, 4), &ctx(), &values, TemplateMode::Token)
                .unwrap();
        assert!(script.contains("# résumé job"));
        assert!(script.ends_with("echo simulation"));
    }

    #[test]
    fn lone_percent_near_non_ascii_stays_verbatim() {
        assert_eq!(
            parse_template_string("80% háček"),
            vec![StringPart::Verbatim("80% háček")]
        );
    }
}
