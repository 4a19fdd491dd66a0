//! 룰 테이블 추상화
//!
//! 판정 로직은 [`RuleTable`] trait만 알고, 실제 저장소는 모릅니다.
//! - 커널: aya-ebpf `Array` / `HashMap` 맵 래퍼
//! - 유저스페이스: [`SlotTable`] (고정 크기 배열, 할당 없음)
//!
//! 조회 결과 `None`은 에러가 아니라 "빈 슬롯"이며, 스캔을 끝내는 정상 조건입니다.

use core::cell::UnsafeCell;

/// 정수 인덱스로 조회하는 고정 용량 룰 테이블
pub trait RuleTable<T> {
    /// `index` 슬롯의 엔트리를 읽기 전용으로 반환합니다.
    ///
    /// # Safety
    /// 반환된 참조가 살아 있는 동안 같은 엔트리가 [`get_ptr_mut`](Self::get_ptr_mut)
    /// 포인터로 변경되면 안 됩니다. 레이트 리밋 카운터처럼 판정 중에 갱신되는
    /// 엔트리는 [`crate::ratelimit::window_snapshot`]으로 읽습니다.
    unsafe fn get(&self, index: u32) -> Option<&T>;

    /// `index` 슬롯의 엔트리에 대한 가변 포인터를 반환합니다.
    ///
    /// 여러 호출자가 동시에 같은 포인터를 받을 수 있으므로,
    /// 공유 필드는 원자적 접근으로만 갱신해야 합니다.
    fn get_ptr_mut(&self, index: u32) -> Option<*mut T>;
}

/// 인덱스가 테이블 용량을 벗어남
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexOutOfRange(pub u32);

/// 고정 크기 슬롯 배열 기반 룰 테이블
///
/// 커널 맵과 같은 의미(인덱스 조회, 빈 슬롯 = `None`)를 유저스페이스에서
/// 재현합니다. 오프라인 검사, 테스트, 퍼징에서 사용됩니다.
///
/// 엔트리 쓰기는 `&mut self`로만 가능하고, 판정 로직은 `&self`에서
/// [`RuleTable::get_ptr_mut`]로 받은 포인터를 통해 카운터를 원자적으로 갱신합니다.
pub struct SlotTable<T, const N: usize> {
    slots: [Option<UnsafeCell<T>>; N],
}

// SAFETY: `&self`를 통한 변경은 RuleTable::get_ptr_mut 포인터로만 일어나며,
// 판정 로직은 그 포인터로 공유 필드를 원자적으로만 갱신합니다.
// 비원자 참조를 내주는 RuleTable::get은 unsafe이고, 슬롯 구조 자체의
// 변경(insert/remove/snapshot)은 `&mut self`를 요구합니다.
unsafe impl<T: Send + Sync, const N: usize> Sync for SlotTable<T, N> {}

impl<T, const N: usize> SlotTable<T, N> {
    /// 빈 테이블을 생성합니다.
    pub fn new() -> Self {
        Self {
            slots: core::array::from_fn(|_| None),
        }
    }

    /// 테이블 용량을 반환합니다.
    pub const fn capacity(&self) -> usize {
        N
    }

    /// 채워진 슬롯 수를 반환합니다.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// 채워진 슬롯이 없는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `index` 슬롯에 엔트리를 기록합니다. 기존 엔트리는 교체됩니다.
    pub fn insert(&mut self, index: u32, entry: T) -> Result<(), IndexOutOfRange> {
        let slot = self
            .slots
            .get_mut(index as usize)
            .ok_or(IndexOutOfRange(index))?;
        *slot = Some(UnsafeCell::new(entry));
        Ok(())
    }

    /// `index` 슬롯을 비우고 기존 엔트리를 반환합니다.
    pub fn remove(&mut self, index: u32) -> Option<T> {
        self.slots
            .get_mut(index as usize)
            .and_then(Option::take)
            .map(UnsafeCell::into_inner)
    }

    /// `index` 슬롯 엔트리의 복사본을 반환합니다.
    ///
    /// `&mut self`를 요구하므로 진행 중인 판정과 경합하지 않습니다.
    pub fn snapshot(&mut self, index: u32) -> Option<T>
    where
        T: Copy,
    {
        self.slots
            .get_mut(index as usize)
            .and_then(Option::as_mut)
            .map(|cell| *cell.get_mut())
    }
}

impl<T, const N: usize> Default for SlotTable<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> RuleTable<T> for SlotTable<T, N> {
    unsafe fn get(&self, index: u32) -> Option<&T> {
        let cell = self.slots.get(index as usize)?.as_ref()?;
        // SAFETY: 호출자가 참조 수명 동안 get_ptr_mut 경유 쓰기가 없음을 보장합니다.
        Some(unsafe { &*cell.get() })
    }

    fn get_ptr_mut(&self, index: u32) -> Option<*mut T> {
        self.slots
            .get(index as usize)?
            .as_ref()
            .map(UnsafeCell::get)
    }
}
