//! 类投影
//!
//! `project` 把宿主类描述整理成 `ClassTemplate`：继承链上的属性被展平，
//! 隐藏成员被剔除，容器协议取生效的那一份。模板在第一次使用时构建，
//! 缓存在类里，之后不再变化。
//!
//! `install` 在某个上下文中为类创建原型对象和构造函数：
//!
//! - 原型链接到基类的原型，实例方法作为不可枚举属性挂在原型上
//! - `Symbol.toStringTag` 为类名，因此 `toString()` 得到 `[object 类名]`
//! - 构造函数的 `name` 为类名，静态方法和类方法挂在构造函数上，
//!   构造函数的原型是基类构造函数
//! - 基类暴露、本类隐藏的名字在本类的原型或构造函数上被遮蔽为 `undefined`

use indexmap::IndexMap;
use rquickjs::{Ctx, Result, Value};
use std::collections::HashSet;
use std::rc::Rc;

use super::method;
use super::state::{BridgeState, Projected};
use crate::host::class::{ClassFn, Getter, InstanceFn, Setter, StaticFn};
use crate::host::{ClassId, HostClass, MappingProtocol, Member, SequenceProtocol};

/// 实例方法槽
pub(crate) struct MethodSlot {
    pub name: String,
    pub callable: InstanceFn,
}

/// 构造函数上的方法槽
pub(crate) enum StaticSlot {
    Static { name: String, callable: StaticFn },
    Class { name: String, callable: ClassFn },
}

impl StaticSlot {
    pub fn name(&self) -> &str {
        match self {
            Self::Static { name, .. } | Self::Class { name, .. } => name,
        }
    }
}

/// 展平后的属性
#[derive(Clone)]
pub(crate) struct PropertySlot {
    pub getter: Getter,
    pub setter: Option<Setter>,
    pub enumerable: bool,
}

/// 类模板
pub struct ClassTemplate {
    id: ClassId,
    name: String,
    methods: Vec<MethodSlot>,
    statics: Vec<StaticSlot>,
    properties: IndexMap<String, PropertySlot>,
    instance_names: HashSet<String>,
    static_names: HashSet<String>,
    shadowed_methods: Vec<String>,
    shadowed_statics: Vec<String>,
    mapping: Option<MappingProtocol>,
    sequence: Option<SequenceProtocol>,
}

impl ClassTemplate {
    fn build(class: &HostClass) -> Self {
        let base = class.base().map(project);

        let mut properties = IndexMap::new();
        let mut instance_names = HashSet::new();
        let mut static_names = HashSet::new();
        let mut shadowed_methods = Vec::new();
        let mut shadowed_statics = Vec::new();

        if let Some(base) = &base {
            for (name, slot) in &base.properties {
                if !class.hides(name) {
                    properties.insert(name.clone(), slot.clone());
                }
            }
            for name in &base.instance_names {
                if class.hides(name) {
                    shadowed_methods.push(name.clone());
                } else {
                    instance_names.insert(name.clone());
                }
            }
            for name in &base.static_names {
                if class.hides(name) {
                    shadowed_statics.push(name.clone());
                } else {
                    static_names.insert(name.clone());
                }
            }
        }

        let mut methods = Vec::new();
        let mut statics = Vec::new();
        for entry in class.members().iter().filter(|entry| !entry.hidden) {
            let name = entry.name.clone();
            match &entry.member {
                Member::InstanceMethod(callable) => {
                    properties.shift_remove(&name);
                    instance_names.insert(name.clone());
                    methods.push(MethodSlot {
                        name,
                        callable: callable.clone(),
                    });
                }
                Member::StaticMethod(callable) => {
                    static_names.insert(name.clone());
                    statics.push(StaticSlot::Static {
                        name,
                        callable: callable.clone(),
                    });
                }
                Member::ClassMethod(callable) => {
                    static_names.insert(name.clone());
                    statics.push(StaticSlot::Class {
                        name,
                        callable: callable.clone(),
                    });
                }
                Member::Property {
                    getter,
                    setter,
                    enumerable,
                } => {
                    instance_names.remove(&name);
                    properties.insert(
                        name,
                        PropertySlot {
                            getter: getter.clone(),
                            setter: setter.clone(),
                            enumerable: *enumerable,
                        },
                    );
                }
            }
        }

        shadowed_methods.sort();
        shadowed_statics.sort();

        Self {
            id: class.id(),
            name: class.name().to_string(),
            methods,
            statics,
            properties,
            instance_names,
            static_names,
            shadowed_methods,
            shadowed_statics,
            mapping: class.mapping().cloned(),
            sequence: class.sequence().cloned(),
        }
    }

    pub fn id(&self) -> ClassId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 本类在原型上定义的实例方法名，按声明顺序
    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.methods.iter().map(|slot| slot.name.as_str())
    }

    /// 本类在构造函数上定义的方法名，按声明顺序
    pub fn static_names(&self) -> impl Iterator<Item = &str> {
        self.statics.iter().map(StaticSlot::name)
    }

    /// 展平后的属性名，基类在前
    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }

    /// 实例上可见的成员（含继承），隐藏成员除外
    pub fn exposes(&self, name: &str) -> bool {
        self.properties.contains_key(name) || self.instance_names.contains(name)
    }

    pub fn mapping(&self) -> Option<&MappingProtocol> {
        self.mapping.as_ref()
    }

    pub fn sequence(&self) -> Option<&SequenceProtocol> {
        self.sequence.as_ref()
    }

    pub(crate) fn property(&self, name: &str) -> Option<&PropertySlot> {
        self.properties.get(name)
    }

    pub(crate) fn properties(&self) -> impl Iterator<Item = (&String, &PropertySlot)> {
        self.properties.iter()
    }
}

/// 取得类模板，首次调用时构建
pub fn project(class: &HostClass) -> Rc<ClassTemplate> {
    class
        .template_cell()
        .get_or_init(|| {
            let template = ClassTemplate::build(class);
            tracing::debug!(
                target: "bridge",
                class = template.name(),
                methods = template.methods.len(),
                statics = template.statics.len(),
                properties = template.properties.len(),
                "Class template built"
            );
            Rc::new(template)
        })
        .clone()
}

/// 在上下文中投影类，已投影时直接返回缓存
pub(crate) fn install<'js>(
    ctx: &Ctx<'js>,
    state: &Rc<BridgeState>,
    class: &HostClass,
) -> Result<Projected<'js>> {
    if let Some(projected) = state.projection(ctx, class.id())? {
        return Ok(projected);
    }

    let template = project(class);
    let parent = match class.base() {
        Some(base) => Some(install(ctx, state, base)?),
        None => None,
    };
    let shim = state.shim(ctx)?;

    let prototype = shim.make_prototype(parent.as_ref().map(|p| &p.prototype))?;
    let proto_value = prototype.clone().into_value();
    for slot in &template.methods {
        let function = method::bind_instance(ctx, state, template.name(), slot, class.id())?;
        shim.define(proto_value.clone(), &slot.name, function.into_value())?;
    }
    for name in &template.shadowed_methods {
        shim.define(proto_value.clone(), name, Value::new_undefined(ctx.clone()))?;
    }

    let construct = method::bind_constructor(ctx, state, class)?;
    let constructor = shim.make_class(
        template.name(),
        construct,
        &prototype,
        parent.as_ref().map(|p| &p.constructor),
        class.id().raw(),
    )?;
    let ctor_value = constructor.clone().into_value();
    for slot in &template.statics {
        let function = method::bind_static(ctx, state, class, slot)?;
        shim.define(ctor_value.clone(), slot.name(), function.into_value())?;
    }
    for name in &template.shadowed_statics {
        shim.define(ctor_value.clone(), name, Value::new_undefined(ctx.clone()))?;
    }

    let projected = Projected {
        constructor,
        prototype,
    };
    state.insert_projection(ctx, class, &projected);
    tracing::debug!(target: "bridge", class = template.name(), id = class.id().raw(), "Class projected");
    Ok(projected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::ClassBuilder;

    struct Animal {
        name: String,
    }

    struct Dog {
        animal: Animal,
    }

    fn animal_class() -> HostClass {
        ClassBuilder::<Animal>::new("Animal")
            .method("speak", |_a, _c| Ok("..."))
            .method("internal", |_a, _c| Ok(()))
            .static_method("kingdom", |_c| Ok("animalia"))
            .class_method("describe", |class, _c| Ok(class.name().to_string()))
            .property("name", |a| Ok(a.name.clone()))
            .property("legs", |_a| Ok(4))
            .enumerable("name")
            .hide("internal")
            .build()
    }

    #[test]
    fn test_template_excludes_hidden() {
        let class = animal_class();
        let template = project(&class);
        assert_eq!(template.name(), "Animal");
        assert_eq!(template.method_names().collect::<Vec<_>>(), vec!["speak"]);
        assert_eq!(
            template.static_names().collect::<Vec<_>>(),
            vec!["kingdom", "describe"]
        );
        assert!(!template.exposes("internal"));
        assert!(template.exposes("speak"));
        assert!(template.property("name").unwrap().enumerable);
        assert!(!template.property("legs").unwrap().enumerable);
    }

    #[test]
    fn test_template_is_cached() {
        let class = animal_class();
        assert!(Rc::ptr_eq(&project(&class), &project(&class)));
    }

    #[test]
    fn test_inherited_members_are_flattened() {
        let animal = animal_class();
        let dog = ClassBuilder::<Dog>::new("Dog")
            .extends(&animal, |dog: &Dog| &dog.animal)
            .method("fetch", |_d, _c| Ok(true))
            .property("breed", |_d| Ok("mutt"))
            .hide("legs")
            .hide("speak")
            .hide("kingdom")
            .build();
        let template = project(&dog);

        assert_eq!(
            template.property_names().collect::<Vec<_>>(),
            vec!["name", "breed"]
        );
        assert_eq!(template.method_names().collect::<Vec<_>>(), vec!["fetch"]);
        assert!(template.exposes("name"));
        assert!(!template.exposes("speak"));
        assert_eq!(template.shadowed_methods, vec!["speak".to_string()]);
        assert_eq!(template.shadowed_statics, vec!["kingdom".to_string()]);
    }

    #[test]
    fn test_effective_protocols() {
        struct List {
            items: Vec<i64>,
        }
        struct Sorted {
            list: List,
        }
        let list = ClassBuilder::<List>::new("List")
            .sequence(|l| l.items.len(), |l, i| Ok(l.items[i as usize]))
            .build();
        let sorted = ClassBuilder::<Sorted>::new("Sorted")
            .extends(&list, |s: &Sorted| &s.list)
            .build();
        assert!(project(&sorted).sequence().is_some());
        assert!(project(&sorted).mapping().is_none());
    }

    #[test]
    fn test_own_method_replaces_inherited_property() {
        let animal = animal_class();
        let robot = ClassBuilder::<Dog>::new("Robot")
            .extends(&animal, |dog: &Dog| &dog.animal)
            .method("legs", |_d, _c| Ok(0))
            .build();
        let template = project(&robot);
        assert!(template.property("legs").is_none());
        assert!(template.exposes("legs"));
    }
}
