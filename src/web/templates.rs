use std::borrow::Cow;

use chrono::{Datelike, Utc};

const PAGE_BASE_STYLES: &str = r#"
        :root { color-scheme: light; }
        body { font-family: "Helvetica Neue", Arial, sans-serif; margin: 0; background: #f8fafc; color: #0f172a; }
        header { background: #ffffff; padding: 2rem 1.5rem; border-bottom: 1px solid #e2e8f0; }
        .header-bar { display: flex; justify-content: space-between; align-items: center; flex-wrap: wrap; gap: 1rem; }
        .header-bar h1 { margin: 0; font-size: 1.6rem; }
        .nav-links { display: flex; gap: 0.75rem; align-items: center; flex-wrap: wrap; }
        .nav-link { display: inline-flex; align-items: center; gap: 0.4rem; color: #1d4ed8; text-decoration: none; font-weight: 600; background: #e0f2fe; padding: 0.5rem 0.95rem; border-radius: 999px; border: 1px solid #bfdbfe; transition: background 0.15s ease, border 0.15s ease; }
        .nav-link:hover { background: #bfdbfe; border-color: #93c5fd; }
        .admin-link { display: inline-flex; align-items: center; gap: 0.35rem; color: #0f172a; background: #fee2e2; border: 1px solid #fecaca; padding: 0.45rem 0.9rem; border-radius: 999px; text-decoration: none; font-weight: 600; }
        .admin-link:hover { background: #fecaca; border-color: #fca5a5; }
        main { padding: 2rem 1.5rem; max-width: 960px; margin: 0 auto; box-sizing: border-box; }
        section { margin-bottom: 2.5rem; }
        .panel { background: #ffffff; border-radius: 12px; border: 1px solid #e2e8f0; padding: 1.5rem; box-shadow: 0 18px 40px rgba(15, 23, 42, 0.08); }
        .panel h2 { margin-top: 0; }
        label { display: block; margin-bottom: 0.5rem; font-weight: 600; color: #0f172a; }
        input[type="text"], input[type="number"], select { width: 100%; padding: 0.75rem; border-radius: 8px; border: 1px solid #cbd5f5; background: #f8fafc; color: #0f172a; box-sizing: border-box; }
        input:focus, select:focus { outline: none; border-color: #2563eb; box-shadow: 0 0 0 3px rgba(37, 99, 235, 0.12); }
        input[type="radio"] { margin-right: 0.45rem; }
        button { padding: 0.85rem 1.2rem; border: none; border-radius: 8px; background: #2563eb; color: #ffffff; font-weight: 600; cursor: pointer; transition: background 0.15s ease; }
        button:hover { background: #1d4ed8; }
        button:disabled { opacity: 0.6; cursor: not-allowed; }
        table { width: 100%; border-collapse: collapse; margin-top: 1.5rem; background: #ffffff; border: 1px solid #e2e8f0; border-radius: 12px; overflow: hidden; }
        th, td { padding: 0.75rem 1rem; border-bottom: 1px solid #e2e8f0; text-align: left; }
        th { background: #f1f5f9; color: #0f172a; font-weight: 600; }
        .flash { margin: 0 auto 1.5rem; max-width: 960px; padding: 0.9rem 1.2rem; border-radius: 10px; font-weight: 600; box-sizing: border-box; }
        .flash.success { background: #dcfce7; color: #166534; border: 1px solid #bbf7d0; }
        .flash.error { background: #fee2e2; color: #b91c1c; border: 1px solid #fecaca; }
        .status-box { margin-top: 1rem; padding: 1rem; border-radius: 12px; background: #f1f5f9; color: #0f172a; min-height: 3rem; }
        .status-box.error { color: #b91c1c; }
        .status-box.success { color: #166534; }
        .note { color: #475569; font-size: 0.95rem; line-height: 1.6; }
        .tool-grid { display: grid; grid-template-columns: repeat(auto-fill, minmax(260px, 1fr)); gap: 1.25rem; }
        .tool-card { background: #ffffff; border-radius: 12px; border: 1px solid #e2e8f0; padding: 1.4rem; box-shadow: 0 12px 30px rgba(15, 23, 42, 0.06); display: flex; flex-direction: column; gap: 0.6rem; }
        .tool-card h3 { margin: 0; font-size: 1.1rem; }
        .tool-card p { margin: 0; color: #475569; font-size: 0.92rem; line-height: 1.5; }
        .tool-card a { margin-top: auto; color: #2563eb; text-decoration: none; font-weight: 600; }
        .tool-card a:hover { text-decoration: underline; }
        .tier-badge { display: inline-flex; align-items: center; padding: 0.25rem 0.75rem; border-radius: 999px; font-size: 0.85rem; font-weight: 600; }
        .tier-badge.free { background: #f1f5f9; color: #475569; }
        .tier-badge.paid { background: #dcfce7; color: #166534; }
        .app-footer { margin-top: 3rem; text-align: center; font-size: 0.85rem; color: #94a3b8; }
        @media (max-width: 768px) {
            header { padding: 1.5rem 1rem; }
            main { padding: 1.5rem 1rem; }
            .header-bar { flex-direction: column; align-items: flex-start; }
            table { font-size: 0.9rem; }
            th, td { padding: 0.5rem; }
        }
"#;

pub struct NavLink<'a> {
    pub href: &'a str,
    pub label: &'a str,
    pub admin: bool,
}

pub struct PageLayout<'a> {
    pub meta_title: &'a str,
    pub page_heading: &'a str,
    pub subtitle_html: Cow<'a, str>,
    pub nav_links: Vec<NavLink<'a>>,
    pub flash_html: Cow<'a, str>,
    pub body_html: Cow<'a, str>,
    pub extra_style_blocks: Vec<Cow<'a, str>>,
    pub body_scripts: Vec<Cow<'a, str>>,
}

pub fn render_page(layout: PageLayout<'_>) -> String {
    let PageLayout {
        meta_title,
        page_heading,
        subtitle_html,
        nav_links,
        flash_html,
        body_html,
        extra_style_blocks,
        body_scripts,
    } = layout;

    let nav_html = nav_links
        .into_iter()
        .map(|link| {
            let class = if link.admin { "admin-link" } else { "nav-link" };
            format!(
                r#"<a class="{class}" href="{href}">{label}</a>"#,
                class = class,
                href = link.href,
                label = link.label,
            )
        })
        .collect::<Vec<_>>()
        .join("\n                ");

    let styles = std::iter::once(Cow::Borrowed(PAGE_BASE_STYLES))
        .chain(extra_style_blocks.into_iter())
        .map(|block| block.into_owned())
        .collect::<Vec<_>>()
        .join("\n");

    let scripts = body_scripts
        .into_iter()
        .map(|script| script.into_owned())
        .collect::<Vec<_>>()
        .join("\n");

    let footer = render_footer();

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>{meta_title}</title>
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <style>
{styles}
    </style>
</head>
<body>
    <header>
        <div class="header-bar">
            <h1>{page_heading}</h1>
            <div class="nav-links">
                {nav_html}
            </div>
        </div>
        <p class="note">{subtitle_html}</p>
    </header>
    <main>
        {flash_html}
{body_html}
        {footer}
    </main>
{scripts}
</body>
</html>"#,
        meta_title = meta_title,
        page_heading = page_heading,
        subtitle_html = subtitle_html,
        nav_html = nav_html,
        flash_html = flash_html,
        body_html = body_html,
        footer = footer,
        styles = styles,
        scripts = scripts,
    )
}

/// Maps redirect flash codes onto user-facing banners. Unknown codes are
/// ignored so a crafted query string cannot inject arbitrary text.
pub fn compose_flash(status: Option<&str>, error: Option<&str>) -> String {
    if let Some(code) = status {
        let message = match code {
            "registered" => "Account created. You can log in now.",
            "logged_out" => "You have been logged out.",
            "user_updated" => "User account updated.",
            "tier_updated" => "Subscription tier updated.",
            _ => return String::new(),
        };
        return format!(r#"<div class="flash success">{message}</div>"#);
    }

    if let Some(code) = error {
        let message = match code {
            "invalid_credentials" => "Invalid email or password.",
            "deactivated" => "This account has been deactivated. Contact support.",
            "invalid_email" => "Please enter a valid email address.",
            "short_username" => "Username must be at least 3 characters long.",
            "short_password" => "Password must be at least 8 characters long.",
            "password_mismatch" => "Passwords do not match.",
            "duplicate" => "An account with that email or username already exists.",
            "cannot_demote_self" => "You cannot remove your own admin access.",
            "unknown_user" => "That user account does not exist.",
            "invalid_tier" => "Unknown subscription tier.",
            "server" => "Something went wrong. Please try again.",
            _ => return String::new(),
        };
        return format!(r#"<div class="flash error">{message}</div>"#);
    }

    String::new()
}

fn render_auth_shell(title: &str, description: &str, flash_html: &str, form_html: &str) -> String {
    let footer = render_footer();
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>{title} · ZenPDF</title>
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <style>
        :root {{ color-scheme: light; }}
        body {{ font-family: "Helvetica Neue", Arial, sans-serif; display: flex; flex-direction: column; align-items: center; justify-content: center; min-height: 100vh; margin: 0; background: #f1f5f9; color: #0f172a; padding: 1.5rem; box-sizing: border-box; gap: 1.5rem; }}
        main {{ width: 100%; max-width: 480px; display: flex; flex-direction: column; align-items: center; gap: 1.5rem; }}
        .panel {{ background: #ffffff; padding: 2.5rem 2.25rem; border-radius: 18px; box-shadow: 0 20px 60px rgba(15, 23, 42, 0.08); width: 100%; border: 1px solid #e2e8f0; box-sizing: border-box; }}
        h1 {{ margin: 0 0 1rem; font-size: 1.8rem; text-align: center; }}
        p.description {{ margin: 0 0 1.75rem; color: #475569; text-align: center; font-size: 0.95rem; }}
        label {{ display: block; margin-top: 1.2rem; font-weight: 600; letter-spacing: 0.01em; color: #0f172a; }}
        input {{ width: 100%; padding: 0.85rem; margin-top: 0.65rem; border-radius: 10px; border: 1px solid #cbd5f5; background: #f8fafc; color: #0f172a; font-size: 1rem; box-sizing: border-box; }}
        input:focus {{ outline: none; border-color: #2563eb; box-shadow: 0 0 0 3px rgba(37, 99, 235, 0.15); }}
        button {{ margin-top: 2rem; width: 100%; padding: 0.95rem; border: none; border-radius: 10px; background: #2563eb; color: #ffffff; font-weight: 600; font-size: 1.05rem; cursor: pointer; transition: background 0.15s ease; }}
        button:hover {{ background: #1d4ed8; }}
        .flash {{ width: 100%; padding: 0.9rem 1.2rem; border-radius: 10px; font-weight: 600; box-sizing: border-box; }}
        .flash.success {{ background: #dcfce7; color: #166534; border: 1px solid #bbf7d0; }}
        .flash.error {{ background: #fee2e2; color: #b91c1c; border: 1px solid #fecaca; }}
        .alt-link {{ text-align: center; margin-top: 1.5rem; font-size: 0.95rem; color: #475569; }}
        .alt-link a {{ color: #2563eb; text-decoration: none; font-weight: 600; }}
        .alt-link a:hover {{ text-decoration: underline; }}
        .app-footer {{ margin-top: 2.5rem; text-align: center; font-size: 0.85rem; color: #64748b; }}
    </style>
</head>
<body>
    <main>
        {flash_html}
        <section class="panel">
            <h1>{title}</h1>
            <p class="description">{description}</p>
{form_html}
        </section>
        {footer}
    </main>
</body>
</html>"#,
        title = title,
        description = description,
        flash_html = flash_html,
        form_html = form_html,
        footer = footer,
    )
}

pub fn render_login_page(flash_html: &str) -> String {
    render_auth_shell(
        "Log in",
        "Split, merge, rotate and compress PDFs from your browser.",
        flash_html,
        r#"            <form method="post" action="/login">
                <label for="email">Email</label>
                <input id="email" type="email" name="email" required>
                <label for="password">Password</label>
                <input id="password" type="password" name="password" required>
                <button type="submit">Log in</button>
            </form>
            <p class="alt-link">New here? <a href="/register">Create an account</a> · <a href="/pricing">See plans</a></p>"#,
    )
}

pub fn render_register_page(flash_html: &str) -> String {
    render_auth_shell(
        "Create an account",
        "Free accounts include 5 operations per day with files up to 10MB.",
        flash_html,
        r#"            <form method="post" action="/register">
                <label for="email">Email</label>
                <input id="email" type="email" name="email" required>
                <label for="username">Username</label>
                <input id="username" name="username" minlength="3" required>
                <label for="password">Password</label>
                <input id="password" type="password" name="password" minlength="8" required>
                <label for="confirm_password">Confirm password</label>
                <input id="confirm_password" type="password" name="confirm_password" minlength="8" required>
                <button type="submit">Register</button>
            </form>
            <p class="alt-link">Already registered? <a href="/login">Log in</a></p>"#,
    )
}

pub fn render_footer() -> String {
    let current_year = Utc::now().year();
    format!(
        r#"<footer class="app-footer">© 2024-{year} ZenPDF. Uploaded files are deleted within one hour.</footer>"#,
        year = current_year
    )
}

pub fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_html_handles_all_specials() {
        assert_eq!(
            escape_html(r#"<a href="x">&'"#),
            "&lt;a href=&quot;x&quot;&gt;&amp;&#39;"
        );
    }

    #[test]
    fn compose_flash_ignores_unknown_codes() {
        assert!(compose_flash(Some("nonsense"), None).is_empty());
        assert!(compose_flash(None, Some("also_nonsense")).is_empty());
    }

    #[test]
    fn compose_flash_prefers_status_over_error() {
        let html = compose_flash(Some("registered"), Some("server"));
        assert!(html.contains("flash success"));
    }

    #[test]
    fn login_page_links_to_register() {
        let html = render_login_page("");
        assert!(html.contains(r#"action="/login""#));
        assert!(html.contains(r#"href="/register""#));
    }
}
