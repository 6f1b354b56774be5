use std::sync::Arc;

use rustc_hash::FxHashMap;

use super::{Argument, DefaultValue, Expression, FunctionDecl, TypeHint};
use crate::span::Span;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Visibility {
    #[default]
    Public,
    Protected,
    Private,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub visibility: Visibility,
    pub is_static: bool,
    pub is_abstract: bool,
    pub is_final: bool,
}

/// `#[Name(args)]` attached to a declaration.
#[derive(Debug, Clone)]
pub struct Annotation {
    pub name: String,
    pub arguments: Vec<Argument>,
    pub span: Span,
}

impl Annotation {
    pub fn new(name: impl Into<String>, arguments: Vec<Argument>) -> Self {
        Self {
            name: name.into(),
            arguments,
            span: Span::default(),
        }
    }
}

#[derive(Debug)]
pub struct Method {
    pub function: Arc<FunctionDecl>,
    pub modifiers: Modifiers,
}

impl Method {
    pub fn new(function: FunctionDecl) -> Self {
        Self {
            function: Arc::new(function),
            modifiers: Modifiers::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.function.name
    }

    pub fn visibility(mut self, visibility: Visibility) -> Self {
        self.modifiers.visibility = visibility;
        self
    }

    pub fn static_method(mut self) -> Self {
        self.modifiers.is_static = true;
        self
    }

    pub fn abstract_method(mut self) -> Self {
        self.modifiers.is_abstract = true;
        self
    }

    pub fn final_method(mut self) -> Self {
        self.modifiers.is_final = true;
        self
    }
}

#[derive(Debug)]
pub struct Property {
    pub name: String,
    pub ty: Option<TypeHint>,
    pub default: DefaultValue,
    pub modifiers: Modifiers,
    pub annotations: Vec<Annotation>,
}

impl Property {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: None,
            default: DefaultValue::default(),
            modifiers: Modifiers::default(),
            annotations: Vec::new(),
        }
    }

    pub fn typed(mut self, ty: TypeHint) -> Self {
        self.ty = Some(ty);
        self
    }

    pub fn with_default(self, default: Expression) -> Self {
        self.default.set(default);
        self
    }

    pub fn visibility(mut self, visibility: Visibility) -> Self {
        self.modifiers.visibility = visibility;
        self
    }

    pub fn static_property(mut self) -> Self {
        self.modifiers.is_static = true;
        self
    }

    pub fn annotated(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }
}

/// A class declaration. Generic classes list their type parameters in
/// `generics`; a specialization carries the concrete class for each of them
/// in `bindings`.
#[derive(Debug, Clone)]
pub struct ClassStmt {
    pub name: String,
    pub extends: Option<String>,
    pub implements: Vec<String>,
    pub generics: Vec<String>,
    pub bindings: FxHashMap<String, String>,
    pub properties: Vec<Arc<Property>>,
    pub methods: FxHashMap<String, Arc<Method>>,
    pub annotations: Vec<Annotation>,
    pub is_abstract: bool,
    pub is_final: bool,
    pub span: Span,
}

impl ClassStmt {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            extends: None,
            implements: Vec::new(),
            generics: Vec::new(),
            bindings: FxHashMap::default(),
            properties: Vec::new(),
            methods: FxHashMap::default(),
            annotations: Vec::new(),
            is_abstract: false,
            is_final: false,
            span: Span::default(),
        }
    }

    pub fn extends(mut self, parent: impl Into<String>) -> Self {
        self.extends = Some(parent.into());
        self
    }

    pub fn implements(mut self, interface: impl Into<String>) -> Self {
        self.implements.push(interface.into());
        self
    }

    pub fn generic(mut self, parameter: impl Into<String>) -> Self {
        self.generics.push(parameter.into());
        self
    }

    pub fn property(mut self, property: Property) -> Self {
        self.properties.push(Arc::new(property));
        self
    }

    pub fn method(mut self, method: Method) -> Self {
        self.methods.insert(method.name().to_string(), Arc::new(method));
        self
    }

    pub fn annotated(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    pub fn abstract_class(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    pub fn final_class(mut self) -> Self {
        self.is_final = true;
        self
    }

    pub fn find_property(&self, name: &str) -> Option<&Arc<Property>> {
        self.properties.iter().find(|property| property.name == name)
    }

    pub fn is_generic(&self) -> bool {
        !self.generics.is_empty()
    }

    /// Concrete class bound to the type parameter `name`.
    pub fn binding(&self, name: &str) -> Option<&str> {
        self.bindings.get(name).map(String::as_str)
    }

    /// A structurally identical class with its type parameters bound.
    /// The template itself is left untouched.
    pub fn specialize(&self, bindings: FxHashMap<String, String>) -> ClassStmt {
        ClassStmt {
            bindings,
            ..self.clone()
        }
    }

    /// Name including bound type arguments, e.g. `DB<Users>`.
    pub fn display_name(&self) -> String {
        if self.bindings.is_empty() {
            return self.name.clone();
        }
        let args: Vec<&str> = self
            .generics
            .iter()
            .map(|parameter| self.binding(parameter).unwrap_or(parameter))
            .collect();
        format!("{}<{}>", self.name, args.join(", "))
    }
}

#[derive(Debug, Clone)]
pub struct InterfaceMethod {
    pub name: String,
    pub param_count: usize,
}

#[derive(Debug, Clone)]
pub struct InterfaceStmt {
    pub name: String,
    pub extends: Vec<String>,
    pub methods: Vec<InterfaceMethod>,
    pub span: Span,
}

impl InterfaceStmt {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            extends: Vec::new(),
            methods: Vec::new(),
            span: Span::default(),
        }
    }

    pub fn extends(mut self, parent: impl Into<String>) -> Self {
        self.extends.push(parent.into());
        self
    }

    pub fn method(mut self, name: impl Into<String>, param_count: usize) -> Self {
        self.methods.push(InterfaceMethod {
            name: name.into(),
            param_count,
        });
        self
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn specialize_leaves_template_alone() {
        let template = ClassStmt::new("DB")
            .generic("T")
            .method(Method::new(FunctionDecl::new("find", vec![], vec![], 0)));
        let mut bindings = FxHashMap::default();
        bindings.insert("T".to_string(), "Users".to_string());

        let users = template.specialize(bindings);
        assert_eq!(users.binding("T"), Some("Users"));
        assert_eq!(users.display_name(), "DB<Users>");
        assert!(template.bindings.is_empty());
        assert!(Arc::ptr_eq(&users.methods["find"], &template.methods["find"]));
    }
}
