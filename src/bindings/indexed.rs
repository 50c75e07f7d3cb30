//! 下标属性拦截
//!
//! 仅对规范数组下标（`"0"`、`"1"` …… 直到 2³²−2）生效，且只在类
//! 声明了序列协议时启用。越界读取返回未找到，从不报错；写入和删除
//! 不做边界检查，直接交给宿主钩子。

use super::interceptor::PropertyDescriptor;
use crate::core::error::HostResult;
use crate::host::{HostObject, HostValue, SequenceProtocol};

/// 最大的合法数组下标（2³²−2）
pub const MAX_INDEX: u32 = u32::MAX - 1;

/// 解析规范数组下标
///
/// 只接受没有前导零、没有符号的十进制表示，与 `String(n) === key` 等价。
pub fn parse_index(key: &str) -> Option<u32> {
    let bytes = key.as_bytes();
    if bytes.is_empty() || bytes.len() > 10 || !bytes.iter().all(u8::is_ascii_digit) {
        return None;
    }
    if bytes.len() > 1 && bytes[0] == b'0' {
        return None;
    }
    let value: u64 = key.parse().ok()?;
    u32::try_from(value).ok().filter(|index| *index <= MAX_INDEX)
}

fn in_range(sequence: &SequenceProtocol, object: &HostObject, index: u32) -> HostResult<bool> {
    Ok((index as usize) < sequence.len(object)?)
}

pub fn get(
    sequence: &SequenceProtocol,
    object: &HostObject,
    index: u32,
) -> HostResult<Option<HostValue>> {
    if !in_range(sequence, object, index)? {
        return Ok(None);
    }
    sequence.get(object, index).map(Some)
}

pub fn set(
    sequence: &SequenceProtocol,
    object: &HostObject,
    index: u32,
    value: HostValue,
) -> HostResult<()> {
    sequence.set(object, index, value)
}

pub fn delete(sequence: &SequenceProtocol, object: &HostObject, index: u32) -> HostResult<()> {
    sequence.delete(object, index)
}

pub fn has(sequence: &SequenceProtocol, object: &HostObject, index: u32) -> HostResult<bool> {
    in_range(sequence, object, index)
}

pub fn query(
    sequence: &SequenceProtocol,
    object: &HostObject,
    index: u32,
) -> HostResult<Option<PropertyDescriptor>> {
    // 与映射键一致，容器元素总是报告可写
    Ok(get(sequence, object, index)?.map(PropertyDescriptor::data))
}

/// `"0"` 到 `"len-1"`，每次调用都重新读取长度
pub fn enumerate(sequence: &SequenceProtocol, object: &HostObject) -> HostResult<Vec<String>> {
    let len = sequence.len(object)?.min(MAX_INDEX as usize + 1);
    Ok((0..len).map(|index| index.to_string()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{ClassBuilder, HostClass};
    use proptest::prelude::*;
    use std::cell::RefCell;

    struct Numbers {
        items: RefCell<Vec<i64>>,
        deleted: RefCell<Vec<u32>>,
    }

    fn numbers_class(writable: bool) -> HostClass {
        let builder = ClassBuilder::<Numbers>::new("Numbers")
            .sequence(
                |numbers| numbers.items.borrow().len(),
                |numbers, index| Ok(numbers.items.borrow()[index as usize]),
            )
            .sequence_delete(|numbers, index| {
                numbers.deleted.borrow_mut().push(index);
                Ok(())
            });
        let builder = if writable {
            builder.sequence_set(|numbers, index, value| {
                let mut items = numbers.items.borrow_mut();
                let index = index as usize;
                if index >= items.len() {
                    items.resize(index + 1, 0);
                }
                items[index] = value.as_int().unwrap_or_default();
                Ok(())
            })
        } else {
            builder
        };
        builder.build()
    }

    fn numbers(class: &HostClass, items: Vec<i64>) -> HostObject {
        HostObject::new(
            class,
            Numbers {
                items: RefCell::new(items),
                deleted: RefCell::new(Vec::new()),
            },
        )
        .unwrap()
    }

    #[test]
    fn test_parse_canonical_indices() {
        assert_eq!(parse_index("0"), Some(0));
        assert_eq!(parse_index("42"), Some(42));
        assert_eq!(parse_index("4294967294"), Some(MAX_INDEX));
        assert_eq!(parse_index("4294967295"), None);
        assert_eq!(parse_index("01"), None);
        assert_eq!(parse_index("-1"), None);
        assert_eq!(parse_index("+1"), None);
        assert_eq!(parse_index("1.0"), None);
        assert_eq!(parse_index(""), None);
        assert_eq!(parse_index("length"), None);
    }

    #[test]
    fn test_bounds() {
        let class = numbers_class(false);
        let object = numbers(&class, vec![10, 20, 30]);
        let sequence = class.sequence().unwrap();

        assert_eq!(get(sequence, &object, 0).unwrap(), Some(HostValue::Int(10)));
        assert_eq!(get(sequence, &object, 2).unwrap(), Some(HostValue::Int(30)));
        assert_eq!(get(sequence, &object, 3).unwrap(), None);
        assert_eq!(get(sequence, &object, MAX_INDEX).unwrap(), None);
        assert!(has(sequence, &object, 2).unwrap());
        assert!(!has(sequence, &object, 3).unwrap());
    }

    #[test]
    fn test_query() {
        let class = numbers_class(false);
        let object = numbers(&class, vec![5]);
        let sequence = class.sequence().unwrap();

        let desc = query(sequence, &object, 0).unwrap().unwrap();
        assert_eq!(desc.value, HostValue::Int(5));
        assert!(desc.writable);
        assert!(!desc.enumerable);
        assert!(desc.configurable);
        assert!(query(sequence, &object, 1).unwrap().is_none());

        let class = numbers_class(true);
        let object = numbers(&class, vec![5]);
        let desc = query(class.sequence().unwrap(), &object, 0).unwrap().unwrap();
        assert!(desc.writable);
    }

    #[test]
    fn test_container_descriptors_agree() {
        struct Fields;
        let class = ClassBuilder::<Fields>::new("Fields")
            .mapping(|_f| vec!["a".to_string()], |_f, _key| Ok(HostValue::Int(1)))
            .sequence(|_f| 1, |_f, _index| Ok(2))
            .build();
        let object = HostObject::new(&class, Fields).unwrap();
        let template = crate::bindings::project(&class);

        let named = crate::bindings::interceptor::query(&template, &object, "a")
            .unwrap()
            .unwrap();
        let indexed = query(class.sequence().unwrap(), &object, 0).unwrap().unwrap();
        assert!(!class.mapping().unwrap().is_writable());
        assert!(!class.sequence().unwrap().is_writable());
        assert_eq!(named.writable, indexed.writable);
        assert!(indexed.writable);
    }

    #[test]
    fn test_set_and_delete_are_unchecked() {
        let class = numbers_class(true);
        let object = numbers(&class, vec![1]);
        let sequence = class.sequence().unwrap();

        set(sequence, &object, 4, HostValue::Int(9)).unwrap();
        assert_eq!(enumerate(sequence, &object).unwrap().len(), 5);
        assert_eq!(get(sequence, &object, 4).unwrap(), Some(HostValue::Int(9)));

        delete(sequence, &object, 100).unwrap();
        let inner = object.downcast_ref::<Numbers>().unwrap();
        assert_eq!(*inner.deleted.borrow(), vec![100]);
    }

    #[test]
    fn test_set_without_hook_is_noop() {
        let class = numbers_class(false);
        let object = numbers(&class, vec![1]);
        let sequence = class.sequence().unwrap();
        set(sequence, &object, 0, HostValue::Int(7)).unwrap();
        assert_eq!(get(sequence, &object, 0).unwrap(), Some(HostValue::Int(1)));
    }

    #[test]
    fn test_enumerate_reads_length_each_time() {
        let class = numbers_class(false);
        let object = numbers(&class, vec![1, 2]);
        let sequence = class.sequence().unwrap();
        assert_eq!(enumerate(sequence, &object).unwrap(), vec!["0", "1"]);

        object
            .downcast_ref::<Numbers>()
            .unwrap()
            .items
            .borrow_mut()
            .push(3);
        assert_eq!(enumerate(sequence, &object).unwrap(), vec!["0", "1", "2"]);
    }

    proptest! {
        #[test]
        fn prop_parse_index_round_trips(index in 0u32..=MAX_INDEX) {
            prop_assert_eq!(parse_index(&index.to_string()), Some(index));
        }

        #[test]
        fn prop_leading_zeros_rejected(index in 0u32..1_000_000, zeros in 1usize..4) {
            let key = format!("{}{}", "0".repeat(zeros), index);
            prop_assert_eq!(parse_index(&key), None);
        }

        #[test]
        fn prop_get_respects_length(len in 0usize..32, index in 0u32..64) {
            let class = numbers_class(false);
            let object = numbers(&class, (0..len as i64).collect());
            let found = get(class.sequence().unwrap(), &object, index).unwrap();
            prop_assert_eq!(found.is_some(), (index as usize) < len);
        }
    }
}
