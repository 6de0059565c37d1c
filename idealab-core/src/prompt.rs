//! Prompt fragments shared by every research domain.
//!
//! Domain modules assemble their task prompts from these pieces plus their
//! own checklist and output contract. All builders are pure functions of the
//! request.

use crate::types::ResearchRequest;

/// Instructions for sites that block, stall or demand a login.
pub fn access_rules(max_steps: usize) -> String {
    format!(
        r#"**Access restrictions (CAPTCHAs, timeouts, paywalls):**
- If a site shows a CAPTCHA or blocks you, do not wait. Skip it and use an alternative source.
- If a page takes longer than 30 seconds to load, move on to another source.
- If you notice yourself repeating the same action, stop and switch to a different task.
- Switch search engines (Google, Bing, DuckDuckGo) when one blocks you.
- Do not log in anywhere (LinkedIn, Crunchbase, social media).
- Prefer sources that load reliably: Wikipedia, news sites, public reports, forums.
- Record every blocked or paywalled source under research limitations.
- You have at most {max_steps} steps. Finishing the research matters more than any single site."#
    )
}

/// Render queries as the bulleted list the agent is asked to run.
pub fn query_list(queries: &[String]) -> String {
    queries
        .iter()
        .map(|q| format!("    - \"{}\"", q))
        .collect::<Vec<_>>()
        .join("\n")
}

/// The shared tail of every query-generation prompt.
pub fn query_rules(request: &ResearchRequest) -> String {
    let problem = request
        .problem_statement
        .as_deref()
        .filter(|p| !p.trim().is_empty())
        .map(|p| format!("\nProblem Statement: \"{}\"", p))
        .unwrap_or_default();
    format!(
        "Business Idea: \"{}\"\nIndustry: {}\nProduct Type: {}{}\n\n\
         Each query should be 2-8 words, use terms real customers and analysts search for, \
         and avoid overly broad industry terms.\n\
         Return exactly 6-8 search queries as a JSON list of strings, for example:\n\
         [\"query one\", \"query two\"]",
        request.business_idea, request.industry, request.product_type, problem
    )
}

/// Closing instruction placed after both output contracts.
pub const FORMAT_REMINDER: &str = "Return the JSON object inside a ```json code block. Only if you cannot produce valid JSON, use the structured text format with the headers exactly as shown. Use null (JSON) or \"Not Found\" (text) for anything you could not find.";
