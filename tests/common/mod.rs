//! 集成测试共用的宿主类

#![allow(dead_code)]

use indexmap::IndexMap;
use script_bridge::{ClassBuilder, HostClass, HostError, HostValue};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// `method()` / 隐藏的 `hidden_method()` / `static_method()`
#[derive(Default)]
pub struct Test {
    pub calls: Cell<u32>,
}

pub fn test_class() -> HostClass {
    ClassBuilder::<Test>::new("Test")
        .constructor(|_call| Ok(Test::default()))
        .method("method", |test, _call| {
            test.calls.set(test.calls.get() + 1);
            Ok("thing")
        })
        .method("hidden_method", |_test, _call| Ok("secret"))
        .method("me", |_test, call| Ok(call.this().cloned()))
        .method("fail", |_test, _call| -> Result<(), HostError> {
            Err(HostError::raised("boom"))
        })
        .method("apply", |_test, call| {
            call.invoke(&call.arg(0), &[HostValue::Int(2)])
        })
        .method("attempt", |_test, call| Ok(call.invoke(&call.arg(0), &[]).is_err()))
        .method("evaluate", |_test, call| call.context().eval(&call.string(0)?))
        .method("lookup", |_test, call| call.context().get(&call.string(0)?))
        .method("global", |_test, call| Ok(call.context().global_object()))
        .static_method("static_method", |_call| Ok("static"))
        .class_method("class_method", |class, _call| Ok(class.name().to_string()))
        .hide("hidden_method")
        .build()
}

pub struct Animal {
    pub name: String,
}

pub struct Dog {
    pub animal: Animal,
    pub tricks: Cell<u32>,
}

pub fn animal_class() -> HostClass {
    ClassBuilder::<Animal>::new("Animal")
        .constructor(|call| {
            Ok(Animal {
                name: call.string(0)?,
            })
        })
        .method("speak", |animal, _call| Ok(format!("{} makes a sound", animal.name)))
        .property("name", |animal| Ok(animal.name.clone()))
        .property("legs", |_animal| Ok(4))
        .class_method("describe", |class, _call| Ok(class.name().to_string()))
        .static_method("kingdom", |_call| Ok("animalia"))
        .enumerable("name")
        .build()
}

pub fn dog_class(animal: &HostClass) -> HostClass {
    ClassBuilder::<Dog>::new("Dog")
        .constructor(|call| {
            Ok(Dog {
                animal: Animal {
                    name: call.string(0)?,
                },
                tricks: Cell::new(0),
            })
        })
        .extends(animal, |dog: &Dog| &dog.animal)
        .method("fetch", |dog, _call| {
            dog.tricks.set(dog.tricks.get() + 1);
            Ok(dog.tricks.get())
        })
        .property("breed", |_dog| Ok("mutt"))
        .hide("legs")
        .hide("kingdom")
        .build()
}

/// 只读属性、带 setter 的属性
pub struct Gauge {
    pub score: Cell<i64>,
}

pub fn gauge_class() -> HostClass {
    ClassBuilder::<Gauge>::new("Gauge")
        .constructor(|_call| Ok(Gauge { score: Cell::new(10) }))
        .property("kind", |_gauge| Ok("gauge"))
        .property_with_setter(
            "score",
            |gauge| Ok(gauge.score.get()),
            |gauge, value| {
                let score = value
                    .as_int()
                    .ok_or_else(|| HostError::type_error("score must be an integer"))?;
                gauge.score.set(score);
                Ok(())
            },
        )
        .enumerable("score")
        .build()
}

/// 映射协议
pub struct Record {
    pub fields: RefCell<IndexMap<String, HostValue>>,
}

pub fn record_class() -> HostClass {
    ClassBuilder::<Record>::new("Record")
        .constructor(|_call| {
            let mut fields = IndexMap::new();
            fields.insert("title".to_string(), HostValue::from("draft"));
            fields.insert("pages".to_string(), HostValue::Int(3));
            Ok(Record {
                fields: RefCell::new(fields),
            })
        })
        .mapping(
            |record| record.fields.borrow().keys().cloned().collect(),
            |record, key| Ok(record.fields.borrow().get(key).cloned()),
        )
        .mapping_set(|record, key, value| {
            record.fields.borrow_mut().insert(key.to_string(), value);
            Ok(())
        })
        .mapping_delete(|record, key| {
            record.fields.borrow_mut().shift_remove(key);
            Ok(())
        })
        .build()
}

/// 序列协议，记录 set/delete 钩子的调用
#[derive(Default)]
pub struct Sequence {
    pub items: RefCell<Vec<i64>>,
    pub sets: RefCell<Vec<(u32, HostValue)>>,
    pub deletes: RefCell<Vec<u32>>,
}

pub fn sequence_class() -> HostClass {
    ClassBuilder::<Sequence>::new("Sequence")
        .constructor(|_call| {
            Ok(Sequence {
                items: RefCell::new(vec![10, 20, 30]),
                ..Sequence::default()
            })
        })
        .sequence(
            |sequence| sequence.items.borrow().len(),
            |sequence, index| Ok(sequence.items.borrow()[index as usize]),
        )
        .sequence_set(|sequence, index, value| {
            sequence.sets.borrow_mut().push((index, value));
            Ok(())
        })
        .sequence_delete(|sequence, index| {
            sequence.deletes.borrow_mut().push(index);
            Ok(())
        })
        .method("push", |sequence, call| {
            sequence.items.borrow_mut().push(call.int(0)?);
            Ok(sequence.items.borrow().len())
        })
        .property("length", |sequence| Ok(sequence.items.borrow().len()))
        .build()
}

/// 作为全局对象绑定
pub struct Globals;

pub fn globals_class() -> HostClass {
    ClassBuilder::<Globals>::new("Globals")
        .constructor(|_call| Ok(Globals))
        .method("method", |_globals, _call| Ok("method"))
        .property("property", |_globals| Ok("property"))
        .build()
}

/// 析构时可观测的宿主对象
pub struct Tracked {
    pub marker: Rc<()>,
}

pub fn tracked_class() -> HostClass {
    ClassBuilder::<Tracked>::new("Tracked")
        .constructor(|_call| {
            Ok(Tracked {
                marker: Rc::new(()),
            })
        })
        .build()
}
