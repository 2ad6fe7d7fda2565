//! Prompt templates for the query router

/// Classification prompt. The model must reply `sql` or `rag`.
pub fn classification(question: &str, context: &str) -> String {
    format!(
        "Decide whether the user question needs a query run against the live \
         database values, or can be answered from the documentation alone.\n\n\
         Reply with:\n\
         - \"sql\" if it needs database data (prices, totals, counts, max or min values)\n\
         - \"rag\" if the documentation below is enough\n\n\
         User question: \"{question}\"\n\n\
         Documentation:\n{context}\n\n\
         Answer with exactly one word: sql or rag"
    )
}

/// Query generation prompt, with the documentation as schema reference
pub fn query_generation(question: &str, context: &str) -> String {
    format!(
        "You are an expert SQL generator.\n\n\
         Write a single SQL SELECT statement that answers the question:\n\
         \"{question}\"\n\n\
         Requirements:\n\
         - Only a SELECT statement, nothing that modifies data.\n\
         - Give result columns useful names (\"price\", not MAX(p.price)).\n\
         - For \"most\", \"highest\" or \"largest\" questions use ORDER BY ... DESC LIMIT 1.\n\
         - No markdown and no explanation, only the SQL text.\n\n\
         Schema documentation:\n{context}"
    )
}

/// Documentation-only answer prompt
pub fn document_answer(question: &str, context: &str) -> String {
    format!(
        "You are an assistant that answers questions about the database schema.\n\
         Use only the documentation below. If the answer is not in it, say \"I don't know\".\n\n\
         Documentation:\n{context}\n\n\
         Question: {question}\n\n\
         Answer:"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompts_embed_question_and_context() {
        let context = "products(id, name, price)";
        for prompt in [
            classification("priciest product?", context),
            query_generation("priciest product?", context),
            document_answer("priciest product?", context),
        ] {
            assert!(prompt.contains("priciest product?"));
            assert!(prompt.contains(context));
        }
    }

    #[test]
    fn test_prompts_are_distinct() {
        let classify = classification("q", "c");
        assert!(classify.ends_with("sql or rag"));
        assert!(!classify.contains("SQL generator"));
        assert!(!document_answer("q", "c").contains("one word"));
    }
}
