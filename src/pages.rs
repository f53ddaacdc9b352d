//! HTML shells for the browser front-end. All content is loaded by the
//! scripts under `/static` from the JSON endpoints.

use maud::{html, Markup, DOCTYPE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Page {
    Overview,
    MyFiles,
    Shared,
}

impl Page {
    fn title(self) -> &'static str {
        match self {
            Page::Overview => "Overview",
            Page::MyFiles => "My Files",
            Page::Shared => "Shared Files",
        }
    }

    fn slug(self) -> &'static str {
        match self {
            Page::Overview => "overview",
            Page::MyFiles => "myfiles",
            Page::Shared => "shared",
        }
    }

    fn href(self) -> &'static str {
        match self {
            Page::Overview => "/",
            Page::MyFiles => "/myfiles",
            Page::Shared => "/shared",
        }
    }
}

fn layout(page: Page) -> Markup {
    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="UTF-8";
                meta name="viewport" content="width=device-width, initial-scale=1.0";
                title { (page.title()) }
                link rel="stylesheet" href="/static/css/style.css";
                script src="/static/js/script.js" defer {}
            }
            body data-page=(page.slug()) {
                nav #sidebar {
                    button #toggleBtn type="button" { "☰" }
                    ul {
                        @for item in [Page::Overview, Page::MyFiles, Page::Shared] {
                            li class=[(item == page).then_some("active")] {
                                a href=(item.href()) { (item.title()) }
                            }
                        }
                    }
                    button #themeToggle type="button" { "Theme" }
                }
                main #content {
                    @match page {
                        Page::Overview => {
                            section #storageOverview {
                                button #refreshBtn type="button" { "Refresh" }
                                div #diskList {}
                            }
                        }
                        Page::MyFiles | Page::Shared => {
                            div #breadcrumb {}
                            table #fileTable {
                                thead {
                                    tr {
                                        th data-sort="name" { "Name" }
                                        th data-sort="size" { "Size" }
                                        th data-sort="modTime" { "Modified" }
                                        th { "" }
                                    }
                                }
                                tbody #fileTableBody {}
                            }
                        }
                    }
                }
            }
        }
    }
}

pub async fn overview() -> Markup {
    layout(Page::Overview)
}

pub async fn my_files() -> Markup {
    layout(Page::MyFiles)
}

pub async fn shared() -> Markup {
    layout(Page::Shared)
}

/// Touch-oriented browser for the shared folders.
pub async fn mobile() -> Markup {
    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="UTF-8";
                meta name="viewport" content="width=device-width, initial-scale=1.0";
                title { "Shared Files" }
                link rel="stylesheet" href="/static/css/mobile.css";
                script src="/static/mobile.js" defer {}
            }
            body {
                div #breadcrumbs {}
                div #loading { "Loading..." }
                div #content {}
                div #mediaModal class="modal" {
                    span class="close" { "×" }
                    div #mediaPreview {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_layout_marks_active_page() {
        let markup = shared().await.into_string();
        assert!(markup.contains(r#"data-page="shared""#));
        assert!(markup.contains(r#"<li class="active"><a href="/shared">"#));
        assert!(markup.contains("fileTableBody"));
    }

    #[tokio::test]
    async fn test_overview_has_disk_list() {
        let markup = overview().await.into_string();
        assert!(markup.contains(r#"id="diskList""#));
        assert!(!markup.contains("fileTableBody"));
    }

    #[tokio::test]
    async fn test_mobile_loads_mobile_script() {
        let markup = mobile().await.into_string();
        assert!(markup.contains("/static/mobile.js"));
    }
}
