//! # Navigation Controller
//!
//! Screen stacks, modal presentation and the side menu, held as plain instance
//! state. A consumer creates one controller, calls [`NavigationController::init`]
//! with the root layout, and passes the controller to whatever needs to
//! navigate. [`NavigationController::teardown`] drops all routing state.
//!
//! ```text
//! NavigationController
//! ├── stacks: HashMap<stack id, Vec<Screen>>
//! ├── initial_stack / current_stack
//! ├── current_screen / previous_screen
//! ├── modal_stacks: Vec<stack id>
//! └── menu: Option<MenuState>   // only for SideMenu roots
//! ```

use std::collections::HashMap;
use std::fmt;

use log::{debug, info};
use serde_json::Value;

/// A single screen and the props it was opened with.
#[derive(Debug, Clone, PartialEq)]
pub struct Screen {
    pub name: String,
    pub props: Value,
}

impl Screen {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            props: Value::Null,
        }
    }

    pub fn with_props(mut self, props: Value) -> Self {
        self.props = props;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tab {
    pub screen: Screen,
    pub label: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuSide {
    Left,
    Right,
}

/// Root layouts a stack can be built from.
#[derive(Debug, Clone, PartialEq)]
pub enum Layout {
    Screen(Screen),
    BottomTabs { tabs: Vec<Tab>, selected: usize },
    SideMenu {
        side: MenuSide,
        menu: Screen,
        center: Box<Layout>,
    },
}

impl Layout {
    /// The screen that is visible when this layout is shown.
    pub fn visible_screen(&self) -> Option<&Screen> {
        match self {
            Layout::Screen(screen) => Some(screen),
            Layout::BottomTabs { tabs, selected } => tabs.get(*selected).map(|t| &t.screen),
            Layout::SideMenu { center, .. } => center.visible_screen(),
        }
    }
}

/// Where to open a screen.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub screen: Screen,
    /// Open in this named stack. A stack not yet known is presented modally.
    pub stack: Option<String>,
}

impl From<Screen> for Route {
    fn from(screen: Screen) -> Self {
        Self {
            screen,
            stack: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MenuState {
    pub side: MenuSide,
    pub visible: bool,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationError {
    NotInitialized,
    /// Nothing left to pop: the consumer should exit.
    AtRoot,
    /// The layout has no visible screen (e.g. empty tab bar).
    EmptyLayout,
}

impl fmt::Display for NavigationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NavigationError::NotInitialized => write!(f, "navigation not initialized"),
            NavigationError::AtRoot => write!(f, "already at the root screen"),
            NavigationError::EmptyLayout => write!(f, "layout has no visible screen"),
        }
    }
}

impl std::error::Error for NavigationError {}

/// Stack id used for modals shown without an explicit stack.
const MODAL_STACK: &str = "MODAL_STACK";

#[derive(Debug, Default)]
pub struct NavigationController {
    initialized: bool,
    initial_stack: String,
    current_stack: String,
    root_layout: Option<Layout>,
    stacks: HashMap<String, Vec<Screen>>,
    /// Stacks currently presented modally, in presentation order.
    modal_stacks: Vec<String>,
    current_screen: Option<String>,
    previous_screen: Option<String>,
    menu: Option<MenuState>,
}

impl NavigationController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the root layout of `initial_stack`. Calling it again resets routing
    /// state but keeps the menu side when the new layout does not name one.
    pub fn init(&mut self, initial_stack: &str, layout: Layout) -> Result<(), NavigationError> {
        let root = layout
            .visible_screen()
            .cloned()
            .ok_or(NavigationError::EmptyLayout)?;

        let previous_side = self.menu.map(|m| m.side);
        self.menu = match &layout {
            Layout::SideMenu { side, .. } => Some(MenuState {
                side: *side,
                visible: false,
                enabled: true,
            }),
            _ => previous_side.map(|side| MenuState {
                side,
                visible: false,
                enabled: true,
            }),
        };

        self.stacks.clear();
        self.modal_stacks.clear();
        self.initial_stack = initial_stack.to_string();
        self.current_stack = initial_stack.to_string();
        self.previous_screen = self.current_screen.take();
        self.current_screen = Some(root.name.clone());
        self.stacks.insert(initial_stack.to_string(), vec![root]);
        self.root_layout = Some(layout);
        self.initialized = true;
        info!("Navigation initialized on stack {initial_stack}");
        Ok(())
    }

    /// Drops all routing state.
    pub fn teardown(&mut self) {
        *self = Self::default();
        debug!("Navigation torn down");
    }

    fn ensure_init(&self) -> Result<(), NavigationError> {
        if self.initialized {
            Ok(())
        } else {
            Err(NavigationError::NotInitialized)
        }
    }

    fn set_current(&mut self, name: Option<String>) {
        self.previous_screen = std::mem::replace(&mut self.current_screen, name);
        if let Some(menu) = self.menu.as_mut() {
            menu.visible = false;
        }
    }

    fn top_of(&self, stack: &str) -> Option<String> {
        self.stacks
            .get(stack)
            .and_then(|s| s.last())
            .map(|s| s.name.clone())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn current_screen(&self) -> Option<&str> {
        self.current_screen.as_deref()
    }

    pub fn previous_screen(&self) -> Option<&str> {
        self.previous_screen.as_deref()
    }

    pub fn current_stack(&self) -> &str {
        &self.current_stack
    }

    pub fn modal_open(&self) -> bool {
        !self.modal_stacks.is_empty()
    }

    pub fn menu(&self) -> Option<MenuState> {
        self.menu
    }

    pub fn initial_stack(&self) -> &str {
        &self.initial_stack
    }

    /// Screens of the current stack, bottom first.
    pub fn stack(&self) -> &[Screen] {
        self.stack_screens(&self.current_stack)
    }

    /// Screens of any stack, bottom first. Empty for unknown stacks.
    pub fn stack_screens(&self, stack: &str) -> &[Screen] {
        self.stacks.get(stack).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Props of the visible screen.
    pub fn current_props(&self) -> Option<&Value> {
        self.stack().last().map(|s| &s.props)
    }

    /// Replaces the root of `stack` (default: the initial stack). With
    /// `set_main`, the new layout also becomes the remembered root layout.
    pub fn set_stack_root(
        &mut self,
        layout: Option<Layout>,
        stack: Option<&str>,
        set_main: bool,
    ) -> Result<(), NavigationError> {
        self.ensure_init()?;
        let layout = match layout {
            Some(layout) => layout,
            None if set_main => return Err(NavigationError::EmptyLayout),
            None => self
                .root_layout
                .clone()
                .ok_or(NavigationError::NotInitialized)?,
        };
        let root = layout
            .visible_screen()
            .cloned()
            .ok_or(NavigationError::EmptyLayout)?;
        let stack = stack.unwrap_or(&self.initial_stack).to_string();
        if set_main {
            self.root_layout = Some(layout);
        }
        if stack == self.current_stack {
            self.set_current(Some(root.name.clone()));
        }
        self.stacks.insert(stack, vec![root]);
        Ok(())
    }

    /// Opens a screen. Pushing the screen that is already visible is a no-op
    /// (returns `false`). A route naming an unknown stack is presented as a
    /// modal; naming a known stack pushes onto it.
    pub fn push(&mut self, route: impl Into<Route>) -> Result<bool, NavigationError> {
        self.ensure_init()?;
        let route = route.into();
        if self.current_screen.as_deref() == Some(route.screen.name.as_str()) {
            debug!("Push of current screen {} ignored", route.screen.name);
            return Ok(false);
        }
        let name = route.screen.name.clone();
        match route.stack {
            // Known stacks (the initial one included) grow; only new ones are modal
            Some(stack) if stack == self.initial_stack || self.stacks.contains_key(&stack) => {
                self.stacks.entry(stack.clone()).or_default().push(route.screen);
                self.current_stack = stack;
            }
            Some(stack) => {
                self.stacks.insert(stack.clone(), vec![route.screen]);
                self.modal_stacks.retain(|s| s != &stack);
                self.modal_stacks.push(stack.clone());
                self.current_stack = stack;
            }
            None => {
                self.stacks
                    .entry(self.current_stack.clone())
                    .or_default()
                    .push(route.screen);
            }
        }
        debug!("Pushed {name} on {}", self.current_stack);
        self.set_current(Some(name));
        Ok(true)
    }

    /// Shows `layout` in a fresh modal stack.
    pub fn show_modal(&mut self, layout: Layout) -> Result<(), NavigationError> {
        self.ensure_init()?;
        let screen = layout
            .visible_screen()
            .cloned()
            .ok_or(NavigationError::EmptyLayout)?;
        let name = screen.name.clone();
        let stack = format!("{MODAL_STACK}{}", self.modal_stacks.len() + 1);
        self.stacks.insert(stack.clone(), vec![screen]);
        self.modal_stacks.push(stack.clone());
        self.current_stack = stack;
        self.set_current(Some(name));
        Ok(())
    }

    /// Closes every modal and returns to the initial stack.
    pub fn dismiss_all_modals(&mut self) -> Result<(), NavigationError> {
        self.ensure_init()?;
        for stack in self.modal_stacks.drain(..) {
            self.stacks.remove(&stack);
        }
        self.current_stack = self.initial_stack.clone();
        let top = self.top_of(&self.initial_stack);
        self.set_current(top);
        Ok(())
    }

    /// Goes back one screen.
    ///
    /// With a modal open over the initial stack, every modal is dismissed.
    /// At the root of a modal stack, every modal closes. At the root of the
    /// initial stack there is nowhere to go: [`NavigationError::AtRoot`].
    pub fn pop(&mut self) -> Result<(), NavigationError> {
        self.ensure_init()?;
        if self.modal_open() && self.current_stack == self.initial_stack {
            return self.dismiss_all_modals();
        }

        let depth = self.stack().len();
        if depth > 1 {
            if let Some(stack) = self.stacks.get_mut(&self.current_stack) {
                stack.pop();
            }
            let top = self.top_of(&self.current_stack);
            self.set_current(top);
            return Ok(());
        }

        if self.modal_open() {
            return self.dismiss_all_modals();
        }

        Err(NavigationError::AtRoot)
    }

    fn menu_mut(&mut self) -> Option<&mut MenuState> {
        self.menu.as_mut()
    }

    pub fn open_menu(&mut self) {
        if let Some(menu) = self.menu_mut().filter(|m| m.enabled) {
            menu.visible = true;
        }
    }

    pub fn close_menu(&mut self) {
        if let Some(menu) = self.menu_mut() {
            menu.visible = false;
        }
    }

    pub fn enable_menu(&mut self) {
        if let Some(menu) = self.menu_mut() {
            menu.enabled = true;
        }
    }

    pub fn disable_menu(&mut self) {
        if let Some(menu) = self.menu_mut() {
            menu.enabled = false;
            menu.visible = false;
        }
    }
}
