use std::path::Path;

use crate::{Error, Result};

const MAIN_ACTION: &str = "android.intent.action.MAIN";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activity {
    pub name: String,
    /// Declares the `MAIN` intent action.
    pub main: bool,
}

/// The parts of `AndroidManifest.xml` needed to launch the app.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AndroidManifest {
    /// May be empty: newer builds declare the namespace in Gradle instead.
    pub package: String,
    pub activities: Vec<Activity>,
}

impl AndroidManifest {
    pub fn parse(path: &Path) -> Result<Self> {
        let xml = std::fs::read_to_string(path)
            .map_err(|e| Error::Manifest(format!("failed to read {}: {}", path.display(), e)))?;
        Self::from_xml(&xml)
    }

    pub fn from_xml(xml: &str) -> Result<Self> {
        use quick_xml::events::Event;
        use quick_xml::Reader;

        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut manifest = AndroidManifest::default();
        let mut state = ParseState::default();
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(ref e)) => visit(&mut manifest, &mut state, e, true),
                Ok(Event::Empty(ref e)) => visit(&mut manifest, &mut state, e, false),
                Ok(Event::End(ref e)) if e.local_name().as_ref() == b"activity" => {
                    state.in_activity = false;
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(Error::Manifest(format!(
                        "XML error at position {}: {}",
                        reader.error_position(),
                        e
                    )))
                }
                _ => {}
            }
            buf.clear();
        }

        if !state.seen_root {
            return Err(Error::Manifest("no <manifest> element".to_string()));
        }
        Ok(manifest)
    }

    /// The activity to launch: the first declaring `MAIN`, else the first one.
    pub fn main_activity(&self) -> Option<&Activity> {
        self.activities
            .iter()
            .find(|a| a.main)
            .or_else(|| self.activities.first())
    }

    /// Fully qualified launch activity. Relative names (`.MainActivity`) are
    /// expanded with the manifest package, or `app_package` when the manifest
    /// has none.
    pub fn main_activity_intent(&self, app_package: &str) -> Option<String> {
        let name = &self.main_activity()?.name;
        if name.is_empty() {
            return None;
        }
        if name.starts_with('.') {
            let package = if self.package.is_empty() { app_package } else { &self.package };
            Some(format!("{package}{name}"))
        } else {
            Some(name.clone())
        }
    }
}

#[derive(Default)]
struct ParseState {
    seen_root: bool,
    in_activity: bool,
}

fn visit(
    manifest: &mut AndroidManifest,
    state: &mut ParseState,
    e: &quick_xml::events::BytesStart,
    is_start: bool,
) {
    match e.local_name().as_ref() {
        b"manifest" => {
            state.seen_root = true;
            manifest.package = get_attr(e, "package");
        }
        b"activity" => {
            manifest.activities.push(Activity { name: get_attr(e, "name"), main: false });
            state.in_activity = is_start;
        }
        b"action" if state.in_activity && get_attr(e, "name") == MAIN_ACTION => {
            if let Some(activity) = manifest.activities.last_mut() {
                activity.main = true;
            }
        }
        _ => {}
    }
}

/// Extract an attribute value by local name, ignoring the namespace prefix.
fn get_attr(e: &quick_xml::events::BytesStart, name: &str) -> String {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == name.as_bytes())
        .and_then(|a| String::from_utf8(a.value.to_vec()).ok())
        .unwrap_or_default()
}
