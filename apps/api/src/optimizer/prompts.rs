use super::OptimizeKind;

pub const SYSTEM: &str = "You are an experienced career coach and resume editor. \
    Rewrite the text you are given so it is clear, specific and results-oriented. \
    Keep every fact the candidate supplied and never invent employers, titles, dates, \
    numbers or skills. Reply with the rewritten text only, without commentary or \
    markdown code fences.";

fn instruction(kind: OptimizeKind) -> &'static str {
    match kind {
        OptimizeKind::ResumeSummary => {
            "Rewrite this professional summary in three to four sentences, \
             leading with the candidate's strongest, most relevant qualifications."
        }
        OptimizeKind::Experience => {
            "Rewrite this work experience description as concise bullet points that \
             start with strong action verbs and emphasise impact and outcomes."
        }
        OptimizeKind::CoverLetter => {
            "Improve this cover letter. Keep it under 400 words, keep the candidate's \
             voice, and make the opening and closing paragraphs specific to the role."
        }
        OptimizeKind::Skills => {
            "Reorder and tidy this skills list, most relevant first, one skill per line, \
             merging duplicates."
        }
    }
}

/// Builds the user message for one optimization request.
pub fn build_prompt(kind: OptimizeKind, content: &str, job_description: Option<&str>) -> String {
    let mut prompt = format!("{}\n\n<text>\n{}\n</text>", instruction(kind), content.trim());
    if let Some(jd) = job_description.map(str::trim).filter(|jd| !jd.is_empty()) {
        prompt.push_str(&format!(
            "\n\nTailor the result to this job description:\n<job_description>\n{jd}\n</job_description>"
        ));
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_includes_content_and_job() {
        let prompt = build_prompt(
            OptimizeKind::Experience,
            " Built APIs ",
            Some("Rust backend role"),
        );
        assert!(prompt.contains("<text>\nBuilt APIs\n</text>"));
        assert!(prompt.contains("Rust backend role"));
        assert!(prompt.starts_with("Rewrite this work experience"));
    }

    #[test]
    fn test_blank_job_description_is_omitted() {
        let prompt = build_prompt(OptimizeKind::Skills, "Rust", Some("  "));
        assert!(!prompt.contains("job_description"));
    }
}
