//! Scripted fake document implementing [`UiDriver`].

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::descriptor::{name_matches, Descriptor, Role};
use crate::driver::{Candidate, ElementHandle, PageSnapshot, UiDriver};
use crate::error::{E2eError, E2eResult};

/// Element of the fake document. Built with the chained constructors below.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeElement {
    pub tag: String,
    pub role: Option<Role>,
    pub text: String,
    pub label: Option<String>,
    pub placeholder: Option<String>,
    pub field_name: Option<String>,
    pub section: Option<String>,
    pub attrs: BTreeMap<String, String>,
    pub options: Vec<String>,
    pub visible: bool,
    pub enabled: bool,
    pub obscured: bool,
    /// Survives screen changes, like a toast that outlives its page
    pub persistent: bool,
    pub value: String,
    pub checked: bool,
}

impl FakeElement {
    fn base(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            role: None,
            text: String::new(),
            label: None,
            placeholder: None,
            field_name: None,
            section: None,
            attrs: BTreeMap::new(),
            options: Vec::new(),
            visible: true,
            enabled: true,
            obscured: false,
            persistent: false,
            value: String::new(),
            checked: false,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self { text: text.into(), ..Self::base("div") }
    }

    pub fn role(role: Role, name: impl Into<String>) -> Self {
        let tag = match role {
            Role::Button => "button",
            Role::Checkbox => "input",
            _ => "div",
        };
        Self {
            role: Some(role),
            text: name.into(),
            ..Self::base(tag)
        }
    }

    pub fn button(name: impl Into<String>) -> Self {
        Self::role(Role::Button, name)
    }

    pub fn tab(name: impl Into<String>) -> Self {
        Self::role(Role::Tab, name)
    }

    pub fn menu_item(name: impl Into<String>) -> Self {
        Self::role(Role::MenuItem, name)
    }

    pub fn option(name: impl Into<String>) -> Self {
        Self::role(Role::Option, name)
    }

    pub fn checkbox(name: impl Into<String>) -> Self {
        Self::role(Role::Checkbox, name).with_attr("type", "checkbox")
    }

    /// Control addressed by an `aria-label`, such as a combobox `Open` toggle
    pub fn label(label: impl Into<String>) -> Self {
        Self {
            tag: "button".to_string(),
            label: Some(label.into()),
            ..Self::base("button")
        }
    }

    pub fn input_placeholder(placeholder: impl Into<String>) -> Self {
        Self {
            placeholder: Some(placeholder.into()),
            ..Self::base("input")
        }
    }

    pub fn input_named(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            field_name: Some(name.clone()),
            ..Self::base("input")
        }
        .with_attr("name", name)
    }

    pub fn select_named<I, S>(name: impl Into<String>, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = name.into();
        Self {
            field_name: Some(name.clone()),
            options: options.into_iter().map(Into::into).collect(),
            ..Self::base("select")
        }
        .with_attr("name", name)
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    pub fn with_class(self, class: impl Into<String>) -> Self {
        self.with_attr("class", class)
    }

    pub fn in_section(mut self, section: impl Into<String>) -> Self {
        self.section = Some(section.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn obscured(mut self) -> Self {
        self.obscured = true;
        self
    }

    pub fn persistent(mut self) -> Self {
        self.persistent = true;
        self
    }

    /// Accessible name used for matching, logs and [`Interaction`]s
    pub fn accessible_name(&self) -> String {
        [
            Some(&self.text),
            self.label.as_ref(),
            self.placeholder.as_ref(),
            self.field_name.as_ref(),
            self.attrs.get("value"),
        ]
        .into_iter()
        .flatten()
        .find(|s| !s.is_empty())
        .cloned()
        .unwrap_or_default()
    }

    fn matches(&self, descriptor: &Descriptor) -> bool {
        match descriptor {
            Descriptor::Role { role, name, exact } => {
                self.role == Some(*role) && name_matches(&self.accessible_name(), name, *exact)
            }
            Descriptor::Label { label } => self
                .label
                .as_deref()
                .is_some_and(|l| name_matches(l, label, false)),
            Descriptor::Placeholder { text } => self
                .placeholder
                .as_deref()
                .is_some_and(|p| name_matches(p, text, false)),
            Descriptor::Text { text, exact } => {
                !self.text.is_empty() && name_matches(&self.text, text, *exact)
            }
            Descriptor::FieldName { name } => self.field_name.as_deref() == Some(name.as_str()),
            Descriptor::Css { selector } => self.matches_css(selector),
            Descriptor::Within { section, target } => {
                self.section
                    .as_deref()
                    .is_some_and(|s| name_matches(s, section, false))
                    && self.matches(target)
            }
        }
    }

    /// Supports `.class`, `tag[attr="value"]` and `[attr="value"]`.
    fn matches_css(&self, selector: &str) -> bool {
        if let Some(class) = selector.strip_prefix('.') {
            return self
                .attrs
                .get("class")
                .is_some_and(|c| c.split_whitespace().any(|x| x == class));
        }
        let Some((tag, rest)) = selector.split_once('[') else {
            return self.tag == selector;
        };
        let Some((key, value)) = rest.trim_end_matches(']').split_once('=') else {
            return false;
        };
        let value = value.trim_matches(|c| c == '"' || c == '\'');
        (tag.is_empty() || self.tag == tag) && self.attrs.get(key).map(String::as_str) == Some(value)
    }
}

/// Something a click can set in motion
#[derive(Debug, Clone)]
pub enum Effect {
    Show(Vec<FakeElement>),
    Navigate(String),
    /// Replace every non-persistent element
    Screen(Vec<FakeElement>),
}

/// Record of what the engine did to the page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interaction {
    Goto { url: String },
    Click { text: String },
    Fill { target: String, value: String },
    Check { target: String },
    Select { target: String, label: String },
}

enum Mutation {
    Add(ElementHandle, FakeElement),
    Remove(ElementHandle),
    Enable(ElementHandle),
    Apply(Effect),
}

struct Reaction {
    trigger: Descriptor,
    delay: Duration,
    effects: Vec<Effect>,
}

struct FakeDom {
    url: String,
    title: String,
    elements: Vec<(ElementHandle, FakeElement)>,
    next_id: u64,
    pending: Vec<(Instant, Mutation)>,
    reactions: Vec<Reaction>,
    interactions: Vec<Interaction>,
    query_latency: Duration,
}

impl FakeDom {
    fn allocate(&mut self) -> ElementHandle {
        self.next_id += 1;
        ElementHandle(format!("e{}", self.next_id))
    }

    /// Apply every mutation that is due, in schedule order.
    fn settle(&mut self) {
        let now = Instant::now();
        let mut due = Vec::new();
        let mut later = Vec::new();
        for (at, m) in self.pending.drain(..) {
            if at <= now {
                due.push((at, m));
            } else {
                later.push((at, m));
            }
        }
        self.pending = later;
        due.sort_by_key(|(at, _)| *at);
        for (_, m) in due {
            self.apply(m);
        }
    }

    fn apply(&mut self, mutation: Mutation) {
        match mutation {
            Mutation::Add(handle, el) => self.elements.push((handle, el)),
            Mutation::Remove(handle) => self.elements.retain(|(h, _)| *h != handle),
            Mutation::Enable(handle) => {
                if let Some((_, el)) = self.elements.iter_mut().find(|(h, _)| *h == handle) {
                    el.enabled = true;
                }
            }
            Mutation::Apply(effect) => match effect {
                Effect::Show(els) => {
                    for el in els {
                        let handle = self.allocate();
                        self.elements.push((handle, el));
                    }
                }
                Effect::Navigate(url) => self.url = url,
                Effect::Screen(els) => {
                    self.elements.retain(|(_, el)| el.persistent);
                    for el in els {
                        let handle = self.allocate();
                        self.elements.push((handle, el));
                    }
                }
            },
        }
    }

    fn schedule(&mut self, delay: Duration, mutation: Mutation) {
        self.pending.push((Instant::now() + delay, mutation));
    }

    fn element_mut(&mut self, handle: &ElementHandle) -> E2eResult<&mut FakeElement> {
        self.elements
            .iter_mut()
            .find(|(h, _)| h == handle)
            .map(|(_, el)| el)
            .ok_or_else(|| E2eError::Driver(format!("element {handle} is detached")))
    }
}

pub struct FakePage {
    dom: Mutex<FakeDom>,
}

impl FakePage {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            dom: Mutex::new(FakeDom {
                url: url.into(),
                title: "Fake".to_string(),
                elements: Vec::new(),
                next_id: 0,
                pending: Vec::new(),
                reactions: Vec::new(),
                interactions: Vec::new(),
                query_latency: Duration::ZERO,
            }),
        }
    }

    pub fn set_title(&self, title: impl Into<String>) {
        self.dom.lock().title = title.into();
    }

    pub fn add(&self, element: FakeElement) -> ElementHandle {
        let mut dom = self.dom.lock();
        let handle = dom.allocate();
        dom.elements.push((handle.clone(), element));
        handle
    }

    pub fn add_after(&self, delay: Duration, element: FakeElement) -> ElementHandle {
        let mut dom = self.dom.lock();
        let handle = dom.allocate();
        dom.schedule(delay, Mutation::Add(handle.clone(), element));
        handle
    }

    pub fn remove_after(&self, delay: Duration, handle: &ElementHandle) {
        self.dom.lock().schedule(delay, Mutation::Remove(handle.clone()));
    }

    pub fn enable_after(&self, delay: Duration, handle: &ElementHandle) {
        self.dom.lock().schedule(delay, Mutation::Enable(handle.clone()));
    }

    pub fn navigate_after(&self, delay: Duration, url: impl Into<String>) {
        self.dom
            .lock()
            .schedule(delay, Mutation::Apply(Effect::Navigate(url.into())));
    }

    /// Every query sleeps this long before answering.
    pub fn set_query_latency(&self, latency: Duration) {
        self.dom.lock().query_latency = latency;
    }

    /// Show `elements` `delay` after any click on an element matching `trigger`.
    pub fn on_click(&self, trigger: Descriptor, delay: Duration, elements: Vec<FakeElement>) {
        self.react(trigger, delay, vec![Effect::Show(elements)]);
    }

    pub fn react(&self, trigger: Descriptor, delay: Duration, effects: Vec<Effect>) {
        self.dom.lock().reactions.push(Reaction { trigger, delay, effects });
    }

    pub fn interactions(&self) -> Vec<Interaction> {
        self.dom.lock().interactions.clone()
    }

    /// Current value of the first element matching `descriptor`
    pub fn value_of(&self, descriptor: &Descriptor) -> Option<String> {
        let mut dom = self.dom.lock();
        dom.settle();
        dom.elements
            .iter()
            .find(|(_, el)| el.matches(descriptor))
            .map(|(_, el)| el.value.clone())
    }
}

#[async_trait]
impl UiDriver for FakePage {
    async fn goto(&self, url: &str) -> E2eResult<()> {
        let mut dom = self.dom.lock();
        dom.settle();
        dom.url = url.to_string();
        dom.interactions.push(Interaction::Goto { url: url.to_string() });
        Ok(())
    }

    async fn current_url(&self) -> E2eResult<String> {
        let mut dom = self.dom.lock();
        dom.settle();
        Ok(dom.url.clone())
    }

    async fn query(&self, descriptor: &Descriptor) -> E2eResult<Vec<Candidate>> {
        let latency = self.dom.lock().query_latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut dom = self.dom.lock();
        dom.settle();
        Ok(dom
            .elements
            .iter()
            .filter(|(_, el)| el.matches(descriptor))
            .map(|(handle, el)| Candidate {
                handle: handle.clone(),
                text: el.accessible_name(),
                visible: el.visible,
                enabled: el.enabled,
                obscured: el.obscured,
            })
            .collect())
    }

    async fn fill(&self, element: &ElementHandle, value: &str) -> E2eResult<()> {
        let mut dom = self.dom.lock();
        dom.settle();
        let el = dom.element_mut(element)?;
        el.value = value.to_string();
        let target = el.accessible_name();
        dom.interactions.push(Interaction::Fill {
            target,
            value: value.to_string(),
        });
        Ok(())
    }

    async fn click(&self, element: &ElementHandle) -> E2eResult<()> {
        let mut dom = self.dom.lock();
        dom.settle();
        let clicked = dom.element_mut(element)?.clone();
        dom.interactions.push(Interaction::Click {
            text: clicked.accessible_name(),
        });

        // Picking an entry closes the open listbox.
        if clicked.role == Some(Role::Option) {
            dom.elements
                .retain(|(_, el)| el.role != Some(Role::Option) || el.persistent);
        }

        let fired: Vec<(Duration, Vec<Effect>)> = dom
            .reactions
            .iter()
            .filter(|r| clicked.matches(&r.trigger))
            .map(|r| (r.delay, r.effects.clone()))
            .collect();
        for (delay, effects) in fired {
            for effect in effects {
                dom.schedule(delay, Mutation::Apply(effect));
            }
        }
        // Zero-delay reactions are visible to the very next query.
        dom.settle();
        Ok(())
    }

    async fn check(&self, element: &ElementHandle) -> E2eResult<()> {
        let mut dom = self.dom.lock();
        dom.settle();
        let el = dom.element_mut(element)?;
        el.checked = true;
        let target = el.accessible_name();
        dom.interactions.push(Interaction::Check { target });
        Ok(())
    }

    async fn select_option(&self, element: &ElementHandle, label: &str) -> E2eResult<()> {
        let mut dom = self.dom.lock();
        dom.settle();
        let el = dom.element_mut(element)?;
        if !el.options.iter().any(|o| o == label) {
            return Err(E2eError::Driver(format!(
                "option \"{}\" not offered by {}",
                label,
                el.accessible_name()
            )));
        }
        el.value = label.to_string();
        let target = el.accessible_name();
        dom.interactions.push(Interaction::Select {
            target,
            label: label.to_string(),
        });
        Ok(())
    }

    async fn snapshot(&self) -> E2eResult<PageSnapshot> {
        let mut dom = self.dom.lock();
        dom.settle();
        let visible_text = dom
            .elements
            .iter()
            .filter(|(_, el)| el.visible && !el.text.is_empty())
            .map(|(_, el)| el.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        Ok(PageSnapshot {
            url: dom.url.clone(),
            title: dom.title.clone(),
            visible_text,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_css_subset() {
        let slot = FakeElement::text("9:00").with_class("slot available-slot");
        assert!(slot.matches_css(".available-slot"));
        assert!(!slot.matches_css(".slot-taken"));

        let pw = FakeElement::base("input").with_attr("type", "password");
        assert!(pw.matches_css("input[type=\"password\"]"));
        assert!(pw.matches_css("[type='password']"));
        assert!(!pw.matches_css("select[type=\"password\"]"));
    }

    #[test]
    fn test_within_requires_section() {
        let toggle = FakeElement::label("Open").in_section("Provider Type");
        assert!(toggle.matches(&Descriptor::dropdown("Provider Type")));
        assert!(!toggle.matches(&Descriptor::dropdown("Gender *")));
        assert!(!FakeElement::label("Open").matches(&Descriptor::dropdown("Provider Type")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_screen_keeps_persistent_elements() {
        let page = FakePage::new("https://portal.test/");
        page.add(FakeElement::text("Saved").persistent());
        page.add(FakeElement::button("Go"));
        page.react(
            Descriptor::button("Go"),
            Duration::ZERO,
            vec![Effect::Screen(vec![FakeElement::text("Next page")])],
        );

        let go = page.query(&Descriptor::button("Go")).await.unwrap();
        page.click(&go[0].handle).await.unwrap();

        let snap = page.snapshot().await.unwrap();
        assert_eq!(snap.visible_text, "Saved\nNext page");
    }
}
