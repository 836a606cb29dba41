use super::*;

impl Dom {
    pub fn attr(&self, node_id: NodeId, name: &str) -> Option<&str> {
        self.element(node_id)?
            .attrs
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn has_attr(&self, node_id: NodeId, name: &str) -> bool {
        self.attr(node_id, name).is_some()
    }

    pub fn set_attr(&mut self, node_id: NodeId, name: &str, value: &str) -> Result<()> {
        let name = name.to_ascii_lowercase();
        if name.is_empty() || name.contains(|ch: char| ch.is_whitespace() || ch == '=') {
            return Err(Error::TreeMutation(format!("invalid attribute name: {name:?}")));
        }
        self.element_mut(node_id)?
            .attrs
            .insert(name, value.to_string());
        Ok(())
    }

    pub fn remove_attr(&mut self, node_id: NodeId, name: &str) -> Result<()> {
        self.element_mut(node_id)?
            .attrs
            .remove(&name.to_ascii_lowercase());
        Ok(())
    }

    /// Reads the `data-*` attribute for a camelCase key (`userId` reads
    /// `data-user-id`).
    pub fn data(&self, node_id: NodeId, key: &str) -> Option<String> {
        self.attr(node_id, &data_key_to_attr_name(key))
            .map(str::to_string)
    }

    pub fn set_data(&mut self, node_id: NodeId, key: &str, value: &str) -> Result<()> {
        self.set_attr(node_id, &data_key_to_attr_name(key), value)
    }

    pub fn remove_data(&mut self, node_id: NodeId, key: &str) -> Result<()> {
        self.remove_attr(node_id, &data_key_to_attr_name(key))
    }

    pub fn class_contains(&self, node_id: NodeId, class_name: &str) -> bool {
        self.attr(node_id, "class")
            .is_some_and(|classes| classes.split_whitespace().any(|c| c == class_name))
    }

    pub fn class_add(&mut self, node_id: NodeId, class_name: &str) -> Result<()> {
        let element = self.element_mut(node_id)?;
        let mut classes = class_tokens(element.attrs.get("class").map(String::as_str));
        if !classes.iter().any(|name| name == class_name) {
            classes.push(class_name.to_string());
        }
        set_class_attr(element, &classes);
        Ok(())
    }

    pub fn class_remove(&mut self, node_id: NodeId, class_name: &str) -> Result<()> {
        let element = self.element_mut(node_id)?;
        let mut classes = class_tokens(element.attrs.get("class").map(String::as_str));
        classes.retain(|name| name != class_name);
        set_class_attr(element, &classes);
        Ok(())
    }

    /// Returns whether the class is present afterwards.
    pub fn class_toggle(&mut self, node_id: NodeId, class_name: &str) -> Result<bool> {
        if self.class_contains(node_id, class_name) {
            self.class_remove(node_id, class_name)?;
            Ok(false)
        } else {
            self.class_add(node_id, class_name)?;
            Ok(true)
        }
    }
}

fn class_tokens(class_attr: Option<&str>) -> Vec<String> {
    class_attr
        .map(|value| value.split_whitespace().map(ToOwned::to_owned).collect())
        .unwrap_or_default()
}

fn set_class_attr(element: &mut Element, classes: &[String]) {
    if classes.is_empty() {
        element.attrs.remove("class");
    } else {
        element.attrs.insert("class".to_string(), classes.join(" "));
    }
}

pub(crate) fn data_key_to_attr_name(key: &str) -> String {
    let mut out = String::from("data-");
    for ch in key.chars() {
        if ch.is_ascii_uppercase() {
            out.push('-');
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}
