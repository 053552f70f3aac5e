use serde::Serialize;

/// One page of results plus the numbers needed to render page links
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Paginator<T> {
    pub data: Vec<T>,
    pub total: u64,
    pub per_page: u64,
    pub current_page: u64,
    pub last_page: u64,
    /// 1-based position of the first item, `None` on an empty page
    pub from: Option<u64>,
    pub to: Option<u64>,
}

impl<T> Paginator<T> {
    pub fn new(data: Vec<T>, total: u64, per_page: u64, current_page: u64) -> Self {
        let per_page = per_page.max(1);
        let last_page = total.div_ceil(per_page).max(1);
        let (from, to) = if data.is_empty() {
            (None, None)
        } else {
            let from = (current_page - 1) * per_page + 1;
            (Some(from), Some(from + data.len() as u64 - 1))
        };

        Self {
            data,
            total,
            per_page,
            current_page,
            last_page,
            from,
            to,
        }
    }

    pub fn has_more_pages(&self) -> bool {
        self.current_page < self.last_page
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Paginator<U> {
        Paginator {
            data: self.data.into_iter().map(f).collect(),
            total: self.total,
            per_page: self.per_page,
            current_page: self.current_page,
            last_page: self.last_page,
            from: self.from,
            to: self.to,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_bounds() {
        let page = Paginator::new(vec![1, 2, 3, 4, 5], 23, 5, 2);
        assert_eq!(page.last_page, 5);
        assert_eq!(page.from, Some(6));
        assert_eq!(page.to, Some(10));
        assert!(page.has_more_pages());

        let last = Paginator::new(vec![21, 22, 23], 23, 5, 5);
        assert_eq!(last.to, Some(23));
        assert!(!last.has_more_pages());
    }

    #[test]
    fn test_empty_page() {
        let page: Paginator<i32> = Paginator::new(vec![], 0, 15, 1);
        assert_eq!(page.last_page, 1);
        assert_eq!(page.from, None);
        assert!(page.is_empty());
    }
}
