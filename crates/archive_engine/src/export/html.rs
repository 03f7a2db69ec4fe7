use std::fmt::Write as _;

use archive_core::{
    Attachment, AttachmentKind, Comment, CommunityArchive, ConversationArchive, ExportFormat,
    ForwardedMessage, Message, Post, RepostedPost,
};
use url::Url;

use super::{ExportError, Renderer};

const STYLE: &str = r#"
body { font-family: -apple-system, "Segoe UI", Roboto, sans-serif; background: #edeef0; color: #222; margin: 0; }
main { max-width: 820px; margin: 0 auto; padding: 16px; }
h1 { font-size: 1.5em; margin: 0 0 4px; }
.meta { color: #626d7a; font-size: 0.9em; margin: 0 0 12px; }
.search { position: sticky; top: 0; background: #edeef0; padding: 8px 0; }
.search input { width: 100%; box-sizing: border-box; padding: 8px; border: 1px solid #c5d0db; border-radius: 6px; }
.card { background: #fff; border-radius: 8px; padding: 12px 16px; margin: 10px 0; box-shadow: 0 1px 2px rgba(0,0,0,.1); }
.card header { display: flex; gap: 10px; align-items: baseline; font-size: 0.85em; color: #626d7a; }
.card header .vk { margin-left: auto; }
.text { margin: 8px 0; white-space: normal; word-wrap: break-word; }
.attachments { margin: 6px 0; padding-left: 18px; font-size: 0.9em; }
blockquote { border-left: 3px solid #c5d0db; margin: 8px 0; padding: 4px 10px; color: #444; }
.stats { font-size: 0.85em; color: #626d7a; display: flex; gap: 14px; }
.pinned { color: #e64646; font-weight: bold; }
details { margin-top: 8px; }
.comment { border-top: 1px solid #e7e8ec; padding: 6px 0 6px 8px; }
.comment.reply { margin-left: 24px; }
a { color: #2a5885; text-decoration: none; }
a:hover { text-decoration: underline; }
"#;

const SCRIPT: &str = r#"
(function () {
  var input = document.getElementById('search');
  var counter = document.getElementById('shown');
  input.addEventListener('input', function () {
    var query = input.value.trim().toLowerCase();
    var shown = 0;
    document.querySelectorAll('.card').forEach(function (card) {
      var hit = !query || card.textContent.toLowerCase().indexOf(query) !== -1;
      card.style.display = hit ? '' : 'none';
      if (hit) { shown += 1; }
    });
    counter.textContent = shown;
  });
})();
"#;

/// Self-contained HTML page with inline styling and client-side search.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlRenderer;

impl Renderer for HtmlRenderer {
    fn format(&self) -> ExportFormat {
        ExportFormat::Html
    }

    fn render_conversation(&self, archive: &ConversationArchive) -> Result<String, ExportError> {
        let mut body = String::new();
        let _ = writeln!(body, "<h1>{}</h1>", escape_html(&archive.title));
        let _ = writeln!(
            body,
            "<p class=\"meta\">{} {} &middot; {} messages &middot; exported {}</p>",
            archive.kind.as_str(),
            archive.peer_id,
            archive.messages.len(),
            escape_html(&archive.export_date)
        );
        body.push_str(&search_box(archive.messages.len()));
        for message in &archive.messages {
            render_message(&mut body, message);
        }
        Ok(page(&archive.title, &body))
    }

    fn render_community(&self, archive: &CommunityArchive) -> Result<String, ExportError> {
        let community = &archive.community;
        let mut body = String::new();
        let _ = writeln!(body, "<h1>{}</h1>", escape_html(&community.name));
        let _ = write!(
            body,
            "<p class=\"meta\">{} members &middot; {} posts &middot; exported {}",
            community.members_count,
            archive.posts_count,
            escape_html(&archive.export_date)
        );
        if !community.screen_name.is_empty() {
            let href = format!("https://vk.com/{}", community.screen_name);
            let _ = write!(body, " &middot; {}", anchor(&href, &community.screen_name));
        }
        body.push_str("</p>\n");
        if !community.description.is_empty() {
            let _ = writeln!(body, "<div class=\"text\">{}</div>", render_markup(&community.description));
        }
        body.push_str(&search_box(archive.posts.len()));
        for post in &archive.posts {
            render_post(&mut body, post);
        }
        Ok(page(&community.name, &body))
    }
}

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"ru\">\n<head>\n<meta charset=\"utf-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
         <title>{}</title>\n<style>{STYLE}</style>\n</head>\n<body>\n<main>\n{body}</main>\n\
         <script>{SCRIPT}</script>\n</body>\n</html>\n",
        escape_html(title)
    )
}

fn search_box(total: usize) -> String {
    format!(
        "<div class=\"search\"><input id=\"search\" type=\"search\" placeholder=\"Search\"> \
         <span class=\"meta\"><span id=\"shown\">{total}</span> shown</span></div>\n"
    )
}

fn render_message(out: &mut String, message: &Message) {
    let _ = writeln!(out, "<article class=\"card message\" id=\"m{}\">", message.message_id);
    header(out, message.from_id, &message.date_iso, Some(message.vk_link.as_str()));
    if let Some(reply_to) = message.reply_to {
        let _ = writeln!(out, "<p class=\"meta\">in reply to <a href=\"#m{reply_to}\">#{reply_to}</a></p>");
    }
    text_block(out, &message.text);
    attachments(out, &message.attachments);
    for forwarded in &message.fwd_messages {
        render_forwarded(out, forwarded);
    }
    out.push_str("</article>\n");
}

fn render_forwarded(out: &mut String, forwarded: &ForwardedMessage) {
    out.push_str("<blockquote class=\"forwarded\">\n");
    header(out, forwarded.from_id, &forwarded.date_iso, forwarded.vk_link.as_deref());
    text_block(out, &forwarded.text);
    attachments(out, &forwarded.attachments);
    if forwarded.truncated_forwards > 0 {
        let _ = writeln!(
            out,
            "<p class=\"meta\">{} more forwarded messages not shown</p>",
            forwarded.truncated_forwards
        );
    }
    out.push_str("</blockquote>\n");
}

fn render_post(out: &mut String, post: &Post) {
    let _ = writeln!(out, "<article class=\"card post\" id=\"p{}\">", post.id);
    header(out, post.from_id, &post.date_iso, Some(post.vk_link.as_str()));
    if post.is_pinned {
        out.push_str("<p class=\"pinned\">Pinned</p>\n");
    }
    text_block(out, &post.text);
    attachments(out, &post.attachments);
    for repost in &post.copy_history {
        render_repost(out, repost);
    }
    let _ = writeln!(
        out,
        "<div class=\"stats\"><span>&#9829; {}</span><span>&#8635; {}</span><span>&#128065; {}</span></div>",
        post.likes.count, post.reposts.count, post.views
    );
    let _ = writeln!(out, "<details><summary>Comments ({})</summary>", post.comments.len());
    if post.comments.is_empty() {
        out.push_str("<p class=\"meta\">No comments</p>\n");
    }
    for comment in &post.comments {
        render_comment(out, comment);
    }
    out.push_str("</details>\n</article>\n");
}

fn render_repost(out: &mut String, repost: &RepostedPost) {
    out.push_str("<blockquote class=\"repost\">\n");
    header(out, repost.owner_id, &repost.date_iso, Some(repost.vk_link.as_str()));
    text_block(out, &repost.text);
    attachments(out, &repost.attachments);
    out.push_str("</blockquote>\n");
}

fn render_comment(out: &mut String, comment: &Comment) {
    let class = if comment.reply_to.is_some() { "comment reply" } else { "comment" };
    let _ = writeln!(out, "<div class=\"{class}\" id=\"c{}\">", comment.id);
    header(out, comment.from_id, &comment.date_iso, Some(comment.vk_link.as_str()));
    text_block(out, &comment.text);
    attachments(out, &comment.attachments);
    out.push_str("</div>\n");
}

fn header(out: &mut String, from_id: i64, date_iso: &str, vk_link: Option<&str>) {
    out.push_str("<header>");
    let author = author_href(from_id);
    let _ = write!(
        out,
        "{} <time datetime=\"{date}\">{date}</time>",
        anchor(&author, &author_label(from_id)),
        date = escape_html(date_iso)
    );
    if let Some(link) = vk_link.filter(|link| safe_href(link).is_some()) {
        let _ = write!(
            out,
            " <a class=\"vk\" href=\"{}\" target=\"_blank\" rel=\"noopener\">open in VK</a>",
            escape_html(link)
        );
    }
    out.push_str("</header>\n");
}

fn author_href(from_id: i64) -> String {
    if from_id < 0 {
        format!("https://vk.com/club{}", from_id.unsigned_abs())
    } else {
        format!("https://vk.com/id{from_id}")
    }
}

fn author_label(from_id: i64) -> String {
    if from_id < 0 {
        format!("club{}", from_id.unsigned_abs())
    } else {
        format!("id{from_id}")
    }
}

fn text_block(out: &mut String, text: &str) {
    if !text.is_empty() {
        let _ = writeln!(out, "<div class=\"text\">{}</div>", render_markup(text));
    }
}

fn attachments(out: &mut String, attachments: &[Attachment]) {
    if attachments.is_empty() {
        return;
    }
    out.push_str("<ul class=\"attachments\">\n");
    for attachment in attachments {
        let label = attachment_label(attachment);
        let _ = write!(out, "<li class=\"attachment {}\">", attachment.kind.as_str());
        match attachment.reference().and_then(safe_href) {
            Some(href) => {
                let _ = write!(out, "<a href=\"{href}\" target=\"_blank\" rel=\"noopener\">{}</a>", escape_html(&label));
            }
            None => out.push_str(&escape_html(&label)),
        }
        out.push_str("</li>\n");
    }
    out.push_str("</ul>\n");
}

fn attachment_label(attachment: &Attachment) -> String {
    let title = attachment.meta_str("title").filter(|t| !t.is_empty());
    match attachment.kind {
        AttachmentKind::Photo => match (attachment.meta_i64("width"), attachment.meta_i64("height")) {
            (Some(w), Some(h)) => format!("Photo {w}x{h}"),
            _ => "Photo".to_string(),
        },
        AttachmentKind::Video => {
            let title = title.unwrap_or("Video");
            match attachment.meta_i64("duration") {
                Some(secs) => format!("{title} ({}:{:02})", secs / 60, secs % 60),
                None => title.to_string(),
            }
        }
        AttachmentKind::Document => {
            let title = title.unwrap_or("Document");
            match attachment.meta_i64("size") {
                Some(size) => format!("{title} ({} KB)", size.max(0) / 1024),
                None => title.to_string(),
            }
        }
        AttachmentKind::Audio => match (attachment.meta_str("artist"), title) {
            (Some(artist), Some(title)) => format!("{artist} - {title}"),
            (None, Some(title)) => title.to_string(),
            (Some(artist), None) => artist.to_string(),
            (None, None) => "Audio".to_string(),
        },
        AttachmentKind::Sticker => "Sticker".to_string(),
        AttachmentKind::Link => title
            .or_else(|| attachment.meta_str("url"))
            .unwrap_or("Link")
            .to_string(),
        AttachmentKind::Other => match attachment.meta_str("raw_type") {
            Some(raw_type) => format!("Attachment ({raw_type})"),
            None => "Attachment".to_string(),
        },
    }
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

/// Escaped href for an absolute `http`/`https` URL; anything else yields `None`.
fn safe_href(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let url = Url::parse(raw).ok()?;
    matches!(url.scheme(), "http" | "https").then(|| escape_html(raw))
}

fn anchor(href: &str, label: &str) -> String {
    format!(
        "<a href=\"{}\" target=\"_blank\" rel=\"noopener\">{}</a>",
        escape_html(href),
        escape_html(label)
    )
}

/// Escapes user text and turns VK inline markup into links.
///
/// Recognized: `[#alias|label|url]` and mentions such as `[id1|Name]`,
/// `[club2|Name]`, `[public3|Name]`. Anything else stays literal text.
pub fn render_markup(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find('[') {
        push_plain(&mut out, &rest[..start]);
        let candidate = &rest[start..];
        let link = candidate
            .find(']')
            .and_then(|end| markup_anchor(&candidate[1..end]).map(|html| (html, end)));
        match link {
            Some((html, end)) => {
                out.push_str(&html);
                rest = &candidate[end + 1..];
            }
            None => {
                out.push('[');
                rest = &candidate[1..];
            }
        }
    }
    push_plain(&mut out, rest);
    out
}

fn push_plain(out: &mut String, text: &str) {
    let mut lines = text.split('\n');
    if let Some(first) = lines.next() {
        out.push_str(&escape_html(first));
    }
    for line in lines {
        out.push_str("<br>\n");
        out.push_str(&escape_html(line));
    }
}

fn markup_anchor(inner: &str) -> Option<String> {
    let parts: Vec<&str> = inner.split('|').collect();
    match parts.as_slice() {
        ["#alias", label, url] => safe_href(url).map(|_| anchor(url.trim(), label)),
        [mention, label] if is_mention(mention) => {
            Some(anchor(&format!("https://vk.com/{mention}"), label))
        }
        _ => None,
    }
}

fn is_mention(candidate: &str) -> bool {
    ["id", "club", "public", "event"].iter().any(|prefix| {
        candidate
            .strip_prefix(prefix)
            .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
    })
}
