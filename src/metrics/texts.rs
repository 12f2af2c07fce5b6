//! Display texts for warn metric notifications
//!
//! Bodies may contain `{site_name}`, `{site_url}`, `{limit}` and `{value}`
//! placeholders, filled in by [`WarnMetricDisplayTexts::render`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::registry::{
    WARN_METRIC_EMAIL_DOMAIN, WARN_METRIC_MFA, WARN_METRIC_NUMBER_OF_ACTIVE_USERS_100,
    WARN_METRIC_NUMBER_OF_ACTIVE_USERS_200, WARN_METRIC_NUMBER_OF_ACTIVE_USERS_300,
    WARN_METRIC_NUMBER_OF_ACTIVE_USERS_500, WARN_METRIC_NUMBER_OF_CHANNELS_50,
    WARN_METRIC_NUMBER_OF_POSTS_2M, WARN_METRIC_NUMBER_OF_TEAMS_5,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarnMetricDisplayTexts {
    pub bot_title: String,
    pub bot_message_body: String,
    pub bot_success_message: String,
    pub email_subject: String,
    pub email_body: String,
}

impl WarnMetricDisplayTexts {
    fn new(title: &str, body: &str, success: &str) -> Self {
        Self {
            bot_title: title.to_string(),
            bot_message_body: body.to_string(),
            bot_success_message: success.to_string(),
            email_subject: format!("[{{site_name}}] {}", title),
            email_body: body.to_string(),
        }
    }

    /// Wording used for metrics without an entry in the table
    pub fn generic(id: &str) -> Self {
        Self::new(
            &format!("Usage threshold reached: {}", id),
            "{site_name} has reached {value} against a limit of {limit}.",
            "Thanks, your request has been recorded.",
        )
    }

    /// Substitute template placeholders
    pub fn render(template: &str, vars: &TemplateVars<'_>) -> String {
        template
            .replace("{site_name}", vars.site_name)
            .replace("{site_url}", vars.site_url)
            .replace("{limit}", &vars.limit.to_string())
            .replace("{value}", vars.value)
    }
}

/// Values substituted into notification templates
#[derive(Debug, Clone)]
pub struct TemplateVars<'a> {
    pub site_name: &'a str,
    pub site_url: &'a str,
    pub limit: i64,
    pub value: &'a str,
}

pub(crate) fn builtin_texts() -> HashMap<String, WarnMetricDisplayTexts> {
    let users = |n: i64| {
        WarnMetricDisplayTexts::new(
            &format!("{} active users", n),
            &format!(
                "{{site_name}} now has more than {} active users. Larger teams benefit from \
                 directory sync, compliance exports and high availability. Visit {{site_url}} \
                 to review your plan.",
                n
            ),
            "Thanks for your interest. Someone will be in touch shortly.",
        )
    };

    let mut texts = HashMap::new();
    texts.insert(
        WARN_METRIC_MFA.to_string(),
        WarnMetricDisplayTexts::new(
            "Multi-factor authentication is not enforced",
            "{site_name} does not require multi-factor authentication. Enforcing MFA protects \
             accounts from password reuse and phishing.",
            "Thanks, MFA enforcement guidance is on its way.",
        ),
    );
    texts.insert(
        WARN_METRIC_EMAIL_DOMAIN.to_string(),
        WarnMetricDisplayTexts::new(
            "Accounts use public email domains",
            "Several accounts on {site_name} were created with public email domains. Restrict \
             sign-up to your organization's domain to keep workspaces private.",
            "Thanks, domain restriction guidance is on its way.",
        ),
    );
    texts.insert(
        WARN_METRIC_NUMBER_OF_TEAMS_5.to_string(),
        WarnMetricDisplayTexts::new(
            "Five or more teams",
            "{site_name} now hosts {value} teams. Advanced permissions help keep many teams \
             manageable.",
            "Thanks for your interest. Someone will be in touch shortly.",
        ),
    );
    texts.insert(
        WARN_METRIC_NUMBER_OF_CHANNELS_50.to_string(),
        WarnMetricDisplayTexts::new(
            "Fifty or more channels",
            "{site_name} now has {value} channels. Channel moderation and retention policies \
             help keep large workspaces organized.",
            "Thanks for your interest. Someone will be in touch shortly.",
        ),
    );
    texts.insert(WARN_METRIC_NUMBER_OF_ACTIVE_USERS_100.to_string(), users(100));
    texts.insert(WARN_METRIC_NUMBER_OF_ACTIVE_USERS_200.to_string(), users(200));
    texts.insert(WARN_METRIC_NUMBER_OF_ACTIVE_USERS_300.to_string(), users(300));
    texts.insert(WARN_METRIC_NUMBER_OF_ACTIVE_USERS_500.to_string(), users(500));
    texts.insert(
        WARN_METRIC_NUMBER_OF_POSTS_2M.to_string(),
        WarnMetricDisplayTexts::new(
            "Two million posts",
            "{site_name} has stored more than {limit} posts. Search performance at this volume \
             benefits from a dedicated search backend.",
            "Thanks for your interest. Someone will be in touch shortly.",
        ),
    );
    texts
}
